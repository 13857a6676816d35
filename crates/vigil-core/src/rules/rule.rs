//! Rules and rule sets, ordered and evaluated first-match-wins.

use serde::{Deserialize, Serialize};

use crate::domain::{CheckDefinition, EvaluationStatus, FieldSchema, Issue, RawResult, Severity};

use super::condition::{Condition, ConditionSpec, Scope};
use super::error::{RuleEvaluationError, RuleLoadError};
use super::template::Template;

/// Issue template as written in a definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueTemplateSpec {
    /// Defaults to the definition's severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub title: String,
    pub description: String,
    pub affected_object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Rule as written in a definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub when: ConditionSpec,
    pub status: EvaluationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueTemplateSpec>,
}

/// Compiled issue template.
#[derive(Debug, Clone)]
pub struct IssueTemplate {
    pub severity: Severity,
    pub title: Template,
    pub description: Template,
    pub affected_object: Template,
    pub evidence: Option<Template>,
}

impl IssueTemplate {
    fn compile(
        spec: &IssueTemplateSpec,
        default_severity: Severity,
        scope: Scope<'_>,
    ) -> Result<Self, RuleLoadError> {
        let parse = |source: &str| -> Result<Template, RuleLoadError> {
            let template =
                Template::parse(source).map_err(|reason| RuleLoadError::InvalidTemplate {
                    check_id: scope.check_id.to_string(),
                    rule: scope.rule,
                    template: source.to_string(),
                    reason,
                })?;
            for field in template.fields() {
                scope.declared(field)?;
            }
            Ok(template)
        };

        Ok(Self {
            severity: spec.severity.unwrap_or(default_severity),
            title: parse(&spec.title)?,
            description: parse(&spec.description)?,
            affected_object: parse(&spec.affected_object)?,
            evidence: spec.evidence.as_deref().map(parse).transpose()?,
        })
    }

    /// Produce the issue for `raw`, substituting placeholders.
    pub fn instantiate(
        &self,
        raw: &RawResult,
        def: &CheckDefinition,
    ) -> Result<Issue, RuleEvaluationError> {
        Ok(Issue {
            check_id: def.id.clone(),
            category: def.category.clone(),
            severity: self.severity,
            title: self.title.render(raw)?,
            description: self.description.render(raw)?,
            affected_object: self.affected_object.render(raw)?,
            evidence: self
                .evidence
                .as_ref()
                .map(|t| t.render(raw))
                .transpose()?,
        })
    }
}

/// One compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Option<String>,
    pub condition: Condition,
    pub status: EvaluationStatus,
    pub issue: Option<IssueTemplate>,
}

/// Ordered rules of one check.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and compile `specs` against the declared `fields`.
    pub fn compile(
        check_id: &str,
        specs: &[RuleSpec],
        fields: &FieldSchema,
        default_severity: Severity,
    ) -> Result<Self, RuleLoadError> {
        let rules = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let scope = Scope {
                    check_id,
                    rule: index,
                    fields,
                };
                Ok(Rule {
                    name: spec.name.clone(),
                    condition: Condition::compile(&spec.when, scope)?,
                    status: spec.status,
                    issue: spec
                        .issue
                        .as_ref()
                        .map(|t| IssueTemplate::compile(t, default_severity, scope))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>, RuleLoadError>>()?;
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldType;
    use serde_json::json;

    fn specs(value: serde_json::Value) -> Vec<RuleSpec> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn compiles_rules_in_order() {
        let fields = FieldSchema::from([("used_pct".to_string(), FieldType::Float)]);
        let set = RuleSet::compile(
            "disk",
            &specs(json!([
                {"name": "critical", "when": {"op": "gte", "field": "used_pct", "value": 95},
                 "status": "fail",
                 "issue": {"title": "Disk full", "description": "{used_pct}% used",
                           "affected_object": "{_check_id}"}},
                {"when": {"op": "always"}, "status": "pass"}
            ])),
            &fields,
            Severity::High,
        )
        .unwrap();

        assert_eq!(set.len(), 2);
        let first = set.iter().next().unwrap();
        assert_eq!(first.name.as_deref(), Some("critical"));
        assert_eq!(first.issue.as_ref().unwrap().severity, Severity::High);
    }

    #[test]
    fn template_placeholder_must_be_declared() {
        let err = RuleSet::compile(
            "disk",
            &specs(json!([
                {"when": {"op": "always"}, "status": "fail",
                 "issue": {"title": "{nope}", "description": "", "affected_object": ""}}
            ])),
            &FieldSchema::new(),
            Severity::Low,
        )
        .unwrap_err();
        assert!(matches!(err, RuleLoadError::UnknownField { ref field, .. } if field == "nope"));
    }

    #[test]
    fn unterminated_placeholder_rejected() {
        let err = RuleSet::compile(
            "disk",
            &specs(json!([
                {"when": {"op": "always"}, "status": "fail",
                 "issue": {"title": "x {", "description": "", "affected_object": ""}}
            ])),
            &FieldSchema::new(),
            Severity::Low,
        )
        .unwrap_err();
        assert!(matches!(err, RuleLoadError::InvalidTemplate { .. }));
    }

    #[test]
    fn unknown_issue_severity_rejected_by_serde() {
        let parsed = serde_json::from_value::<Vec<RuleSpec>>(json!([
            {"when": {"op": "always"}, "status": "fail",
             "issue": {"severity": "severe", "title": "t", "description": "d",
                       "affected_object": "o"}}
        ]));
        assert!(parsed.is_err());
    }
}
