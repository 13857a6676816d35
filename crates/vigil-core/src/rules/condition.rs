//! Rule conditions: the declarative AST and its compiled, validated form.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::result::{FIELD_CHECK_ID, FIELD_DURATION_MS, FIELD_ERROR, FIELD_STATUS};
use crate::domain::{FieldSchema, FieldType, FieldValue, RawResult, RawStatus};

use super::error::{RuleEvaluationError, RuleLoadError};

/// Declarative condition as written in a definition file (`"when"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConditionSpec {
    Always,
    Exists { field: String },
    Eq { field: String, value: FieldValue },
    Ne { field: String, value: FieldValue },
    Gt { field: String, value: f64 },
    Gte { field: String, value: f64 },
    Lt { field: String, value: f64 },
    Lte { field: String, value: f64 },
    Contains { field: String, value: FieldValue },
    Matches { field: String, pattern: String },
    In { field: String, values: Vec<FieldValue> },
    Status { is: RawStatus },
    All { conditions: Vec<ConditionSpec> },
    Any { conditions: Vec<ConditionSpec> },
    Not { condition: Box<ConditionSpec> },
}

/// Numeric comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl NumOp {
    pub fn as_str(self) -> &'static str {
        match self {
            NumOp::Gt => "gt",
            NumOp::Gte => "gte",
            NumOp::Lt => "lt",
            NumOp::Lte => "lte",
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            NumOp::Gt => lhs > rhs,
            NumOp::Gte => lhs >= rhs,
            NumOp::Lt => lhs < rhs,
            NumOp::Lte => lhs <= rhs,
        }
    }
}

/// Compiled condition. Field references are known to be declared and
/// regexes are compiled.
#[derive(Debug, Clone)]
pub enum Condition {
    Always,
    Exists(String),
    Equals {
        field: String,
        value: FieldValue,
        negate: bool,
    },
    Numeric {
        field: String,
        op: NumOp,
        value: f64,
    },
    Contains {
        field: String,
        value: FieldValue,
    },
    Matches {
        field: String,
        regex: Regex,
    },
    In {
        field: String,
        values: Vec<FieldValue>,
    },
    Status(RawStatus),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

/// Where a condition is being compiled, for error reporting and field lookup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub check_id: &'a str,
    pub rule: usize,
    pub fields: &'a FieldSchema,
}

impl Scope<'_> {
    /// Declared type of `field`; envelope pseudo-fields are always declared.
    pub fn declared(&self, field: &str) -> Result<FieldType, RuleLoadError> {
        let reserved = match field {
            FIELD_CHECK_ID | FIELD_STATUS | FIELD_ERROR => Some(FieldType::Text),
            FIELD_DURATION_MS => Some(FieldType::Int),
            _ => None,
        };
        reserved
            .or_else(|| self.fields.get(field).copied())
            .ok_or_else(|| RuleLoadError::UnknownField {
                check_id: self.check_id.to_string(),
                rule: self.rule,
                field: field.to_string(),
            })
    }

    fn literal_fits(
        &self,
        field: &str,
        declared: FieldType,
        value: &FieldValue,
    ) -> Result<(), RuleLoadError> {
        if declared.admits(value) {
            Ok(())
        } else {
            Err(RuleLoadError::LiteralTypeMismatch {
                check_id: self.check_id.to_string(),
                rule: self.rule,
                field: field.to_string(),
                declared: declared.to_string(),
                literal: value.type_name(),
            })
        }
    }

    fn inapplicable(&self, op: &'static str, field: &str, declared: FieldType) -> RuleLoadError {
        RuleLoadError::InapplicableOperator {
            check_id: self.check_id.to_string(),
            rule: self.rule,
            op,
            field: field.to_string(),
            declared: declared.to_string(),
        }
    }

    fn empty_group(&self, op: &'static str) -> RuleLoadError {
        RuleLoadError::EmptyGroup {
            check_id: self.check_id.to_string(),
            rule: self.rule,
            op,
        }
    }
}

impl Condition {
    pub(crate) fn compile(spec: &ConditionSpec, scope: Scope<'_>) -> Result<Self, RuleLoadError> {
        match spec {
            ConditionSpec::Always => Ok(Condition::Always),
            ConditionSpec::Exists { field } => {
                scope.declared(field)?;
                Ok(Condition::Exists(field.clone()))
            }
            ConditionSpec::Eq { field, value } | ConditionSpec::Ne { field, value } => {
                let declared = scope.declared(field)?;
                scope.literal_fits(field, declared, value)?;
                Ok(Condition::Equals {
                    field: field.clone(),
                    value: value.clone(),
                    negate: matches!(spec, ConditionSpec::Ne { .. }),
                })
            }
            ConditionSpec::Gt { field, value } => Self::numeric(scope, field, NumOp::Gt, *value),
            ConditionSpec::Gte { field, value } => Self::numeric(scope, field, NumOp::Gte, *value),
            ConditionSpec::Lt { field, value } => Self::numeric(scope, field, NumOp::Lt, *value),
            ConditionSpec::Lte { field, value } => Self::numeric(scope, field, NumOp::Lte, *value),
            ConditionSpec::Contains { field, value } => {
                let declared = scope.declared(field)?;
                match declared {
                    FieldType::Text => scope.literal_fits(field, declared, value)?,
                    FieldType::List | FieldType::Any => {}
                    other => return Err(scope.inapplicable("contains", field, other)),
                }
                Ok(Condition::Contains {
                    field: field.clone(),
                    value: value.clone(),
                })
            }
            ConditionSpec::Matches { field, pattern } => {
                let declared = scope.declared(field)?;
                if !matches!(declared, FieldType::Text | FieldType::Any) {
                    return Err(scope.inapplicable("matches", field, declared));
                }
                let regex = Regex::new(pattern).map_err(|e| RuleLoadError::InvalidRegex {
                    check_id: scope.check_id.to_string(),
                    rule: scope.rule,
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Condition::Matches {
                    field: field.clone(),
                    regex,
                })
            }
            ConditionSpec::In { field, values } => {
                let declared = scope.declared(field)?;
                if values.is_empty() {
                    return Err(scope.empty_group("in"));
                }
                for value in values {
                    scope.literal_fits(field, declared, value)?;
                }
                Ok(Condition::In {
                    field: field.clone(),
                    values: values.clone(),
                })
            }
            ConditionSpec::Status { is } => Ok(Condition::Status(*is)),
            ConditionSpec::All { conditions } => {
                if conditions.is_empty() {
                    return Err(scope.empty_group("all"));
                }
                Ok(Condition::All(Self::compile_all(conditions, scope)?))
            }
            ConditionSpec::Any { conditions } => {
                if conditions.is_empty() {
                    return Err(scope.empty_group("any"));
                }
                Ok(Condition::Any(Self::compile_all(conditions, scope)?))
            }
            ConditionSpec::Not { condition } => {
                Ok(Condition::Not(Box::new(Self::compile(condition, scope)?)))
            }
        }
    }

    fn compile_all(
        specs: &[ConditionSpec],
        scope: Scope<'_>,
    ) -> Result<Vec<Condition>, RuleLoadError> {
        specs.iter().map(|s| Self::compile(s, scope)).collect()
    }

    fn numeric(
        scope: Scope<'_>,
        field: &str,
        op: NumOp,
        value: f64,
    ) -> Result<Self, RuleLoadError> {
        let declared = scope.declared(field)?;
        if !declared.is_numeric() {
            return Err(RuleLoadError::NonNumericField {
                check_id: scope.check_id.to_string(),
                rule: scope.rule,
                op: op.as_str(),
                field: field.to_string(),
                declared: declared.to_string(),
            });
        }
        Ok(Condition::Numeric {
            field: field.to_string(),
            op,
            value,
        })
    }

    /// Evaluate against a raw result. `all` and `any` short-circuit.
    pub fn eval(&self, raw: &RawResult) -> Result<bool, RuleEvaluationError> {
        match self {
            Condition::Always => Ok(true),
            Condition::Exists(field) => Ok(raw.lookup(field).is_some()),
            Condition::Equals {
                field,
                value,
                negate,
            } => {
                let actual = require(raw, field)?;
                match actual.typed_eq(value) {
                    Some(eq) => Ok(eq != *negate),
                    None => Err(mismatch(
                        field,
                        if *negate { "ne" } else { "eq" },
                        value.type_name(),
                        &actual,
                    )),
                }
            }
            Condition::Numeric { field, op, value } => {
                let actual = require(raw, field)?;
                let lhs = actual
                    .as_f64()
                    .ok_or_else(|| mismatch(field, op.as_str(), "number", &actual))?;
                Ok(op.apply(lhs, *value))
            }
            Condition::Contains { field, value } => {
                let actual = require(raw, field)?;
                match (actual.as_ref(), value) {
                    (FieldValue::Text(haystack), FieldValue::Text(needle)) => {
                        Ok(haystack.contains(needle.as_str()))
                    }
                    (FieldValue::List(items), needle) => {
                        Ok(items.iter().any(|i| i.typed_eq(needle) == Some(true)))
                    }
                    _ => Err(mismatch(field, "contains", "text or list", &actual)),
                }
            }
            Condition::Matches { field, regex } => {
                let actual = require(raw, field)?;
                match actual.as_text() {
                    Some(text) => Ok(regex.is_match(text)),
                    None => Err(mismatch(field, "matches", "text", &actual)),
                }
            }
            Condition::In { field, values } => {
                let actual = require(raw, field)?;
                let mut comparable = false;
                for candidate in values {
                    match actual.typed_eq(candidate) {
                        Some(true) => return Ok(true),
                        Some(false) => comparable = true,
                        None => {}
                    }
                }
                if comparable {
                    Ok(false)
                } else {
                    let expected = values.first().map(FieldValue::type_name).unwrap_or("value");
                    Err(mismatch(field, "in", expected, &actual))
                }
            }
            Condition::Status(status) => Ok(raw.status == *status),
            Condition::All(conditions) => {
                for c in conditions {
                    if !c.eval(raw)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(conditions) => {
                for c in conditions {
                    if c.eval(raw)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!inner.eval(raw)?),
        }
    }
}

fn require<'r>(
    raw: &'r RawResult,
    field: &str,
) -> Result<std::borrow::Cow<'r, FieldValue>, RuleEvaluationError> {
    raw.lookup(field)
        .ok_or_else(|| RuleEvaluationError::MissingField {
            field: field.to_string(),
        })
}

fn mismatch(
    field: &str,
    op: &'static str,
    expected: &'static str,
    actual: &FieldValue,
) -> RuleEvaluationError {
    RuleEvaluationError::TypeMismatch {
        field: field.to_string(),
        op,
        expected,
        actual: actual.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckId, FieldMap};
    use chrono::Utc;
    use serde_json::json;

    fn schema() -> FieldSchema {
        FieldSchema::from([
            ("used_pct".to_string(), FieldType::Float),
            ("mount".to_string(), FieldType::Text),
            ("flags".to_string(), FieldType::List),
            ("enabled".to_string(), FieldType::Bool),
            ("anything".to_string(), FieldType::Any),
        ])
    }

    fn compile(spec: serde_json::Value) -> Result<Condition, RuleLoadError> {
        let spec: ConditionSpec = serde_json::from_value(spec).unwrap();
        let fields = schema();
        Condition::compile(
            &spec,
            Scope {
                check_id: "disk",
                rule: 0,
                fields: &fields,
            },
        )
    }

    fn raw(fields: serde_json::Value) -> RawResult {
        let now = Utc::now();
        let fields: FieldMap = FieldValue::map_from_json(fields).unwrap();
        RawResult::completed(CheckId::from("disk"), now, now, fields, None)
    }

    #[test]
    fn spec_rejects_unknown_operator() {
        let err = serde_json::from_value::<ConditionSpec>(json!({"op": "between", "field": "x"}));
        assert!(err.is_err());
    }

    #[test]
    fn numeric_comparison_on_int_and_float() {
        let c = compile(json!({"op": "gte", "field": "used_pct", "value": 90})).unwrap();
        assert!(c.eval(&raw(json!({"used_pct": 90}))).unwrap());
        assert!(c.eval(&raw(json!({"used_pct": 95.5}))).unwrap());
        assert!(!c.eval(&raw(json!({"used_pct": 89.9}))).unwrap());
    }

    #[test]
    fn unknown_field_rejected_at_load() {
        let err = compile(json!({"op": "eq", "field": "nope", "value": 1})).unwrap_err();
        assert!(matches!(err, RuleLoadError::UnknownField { ref field, .. } if field == "nope"));
    }

    #[test]
    fn numeric_op_on_text_field_rejected_at_load() {
        let err = compile(json!({"op": "gt", "field": "mount", "value": 1})).unwrap_err();
        assert!(matches!(err, RuleLoadError::NonNumericField { .. }));
    }

    #[test]
    fn literal_type_mismatch_rejected_at_load() {
        let err = compile(json!({"op": "eq", "field": "enabled", "value": "yes"})).unwrap_err();
        assert!(matches!(err, RuleLoadError::LiteralTypeMismatch { .. }));
    }

    #[test]
    fn invalid_regex_rejected_at_load() {
        let err = compile(json!({"op": "matches", "field": "mount", "pattern": "(["})).unwrap_err();
        assert!(matches!(err, RuleLoadError::InvalidRegex { .. }));
    }

    #[test]
    fn empty_groups_rejected_at_load() {
        assert!(matches!(
            compile(json!({"op": "all", "conditions": []})).unwrap_err(),
            RuleLoadError::EmptyGroup { op: "all", .. }
        ));
        assert!(matches!(
            compile(json!({"op": "in", "field": "mount", "values": []})).unwrap_err(),
            RuleLoadError::EmptyGroup { op: "in", .. }
        ));
    }

    #[test]
    fn envelope_fields_are_always_declared() {
        let c = compile(json!({"op": "gt", "field": "_duration_ms", "value": 5000})).unwrap();
        assert!(!c.eval(&raw(json!({}))).unwrap());
        assert!(compile(json!({"op": "exists", "field": "_error"})).is_ok());
    }

    #[test]
    fn missing_field_is_evaluation_error() {
        let c = compile(json!({"op": "gt", "field": "used_pct", "value": 90})).unwrap();
        let err = c.eval(&raw(json!({}))).unwrap_err();
        assert!(matches!(err, RuleEvaluationError::MissingField { .. }));
    }

    #[test]
    fn runtime_type_mismatch_is_evaluation_error() {
        let c = compile(json!({"op": "gt", "field": "anything", "value": 1})).unwrap();
        let err = c.eval(&raw(json!({"anything": "high"}))).unwrap_err();
        assert!(matches!(
            err,
            RuleEvaluationError::TypeMismatch { op: "gt", actual: "text", .. }
        ));
    }

    #[test]
    fn contains_text_and_list() {
        let text = compile(json!({"op": "contains", "field": "mount", "value": "var"})).unwrap();
        assert!(text.eval(&raw(json!({"mount": "/var/lib"}))).unwrap());

        let list = compile(json!({"op": "contains", "field": "flags", "value": "noexec"})).unwrap();
        assert!(list.eval(&raw(json!({"flags": ["ro", "noexec"]}))).unwrap());
        assert!(!list.eval(&raw(json!({"flags": ["ro"]}))).unwrap());
    }

    #[test]
    fn in_matches_any_candidate() {
        let c = compile(json!({"op": "in", "field": "mount", "values": ["/", "/boot"]})).unwrap();
        assert!(c.eval(&raw(json!({"mount": "/boot"}))).unwrap());
        assert!(!c.eval(&raw(json!({"mount": "/var"}))).unwrap());
    }

    #[test]
    fn any_short_circuits_before_erroring_branch() {
        let c = compile(json!({"op": "any", "conditions": [
            {"op": "always"},
            {"op": "gt", "field": "used_pct", "value": 1}
        ]}))
        .unwrap();
        // second branch would fail on the missing field
        assert!(c.eval(&raw(json!({}))).unwrap());
    }

    #[test]
    fn not_and_status() {
        let c = compile(json!({"op": "not", "condition": {"op": "status", "is": "completed"}}))
            .unwrap();
        assert!(!c.eval(&raw(json!({}))).unwrap());

        let now = Utc::now();
        let errored = RawResult::error(CheckId::from("disk"), now, now, "boom");
        assert!(c.eval(&errored).unwrap());
    }

    #[test]
    fn ne_is_negated_eq() {
        let c = compile(json!({"op": "ne", "field": "enabled", "value": true})).unwrap();
        assert!(c.eval(&raw(json!({"enabled": false}))).unwrap());
        assert!(!c.eval(&raw(json!({"enabled": true}))).unwrap());
    }
}
