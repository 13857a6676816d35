//! Rule loading and evaluation errors.

/// A definition or its rules failed validation. Raised at load time only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleLoadError {
    #[error("failed to parse definitions in {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("definition has an empty check_id")]
    EmptyCheckId,

    #[error("duplicate check_id: {check_id}")]
    DuplicateCheckId { check_id: String },

    #[error("check {check_id}: declared field `{field}` uses the reserved `_` prefix")]
    ReservedFieldDeclared { check_id: String, field: String },

    #[error("check {check_id}, rule {rule}: field `{field}` is not declared")]
    UnknownField {
        check_id: String,
        rule: usize,
        field: String,
    },

    #[error("check {check_id}, rule {rule}: `{op}` needs a numeric field but `{field}` is {declared}")]
    NonNumericField {
        check_id: String,
        rule: usize,
        op: &'static str,
        field: String,
        declared: String,
    },

    #[error("check {check_id}, rule {rule}: `{op}` is not applicable to `{field}` ({declared})")]
    InapplicableOperator {
        check_id: String,
        rule: usize,
        op: &'static str,
        field: String,
        declared: String,
    },

    #[error("check {check_id}, rule {rule}: literal of type {literal} cannot match `{field}` ({declared})")]
    LiteralTypeMismatch {
        check_id: String,
        rule: usize,
        field: String,
        declared: String,
        literal: &'static str,
    },

    #[error("check {check_id}, rule {rule}: invalid regex `{pattern}`: {reason}")]
    InvalidRegex {
        check_id: String,
        rule: usize,
        pattern: String,
        reason: String,
    },

    #[error("check {check_id}, rule {rule}: `{op}` needs at least one condition")]
    EmptyGroup {
        check_id: String,
        rule: usize,
        op: &'static str,
    },

    #[error("check {check_id}, rule {rule}: template `{template}`: {reason}")]
    InvalidTemplate {
        check_id: String,
        rule: usize,
        template: String,
        reason: String,
    },
}

/// A condition or template could not be evaluated against a raw result.
/// Recovered by the evaluator into a failed result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleEvaluationError {
    #[error("field `{field}` missing from probe output")]
    MissingField { field: String },

    #[error("field `{field}` is {actual}, `{op}` expects {expected}")]
    TypeMismatch {
        field: String,
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
}
