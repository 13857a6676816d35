//! Evaluated check results: the rule engine's output.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::check::{CategoryId, CheckDefinition, CheckId};
use crate::domain::issue::Issue;
use crate::domain::result::{RawResult, RawStatus};

/// Verdict for one evaluated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pass,
    Warning,
    Fail,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pass => "pass",
            EvaluationStatus::Warning => "warning",
            EvaluationStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated result. Created once by the evaluator and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedResult {
    pub check_id: CheckId,
    pub check_name: String,
    pub category: CategoryId,
    pub status: EvaluationStatus,
    pub issues: Vec<Issue>,
    pub raw_status: RawStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Index of the rule that decided the status, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<usize>,
    /// Set when a rule could not be evaluated and the result failed closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_error: Option<String>,
}

impl EvaluatedResult {
    /// Outcome skeleton carrying the identity and timing of `raw`.
    pub(crate) fn skeleton(
        raw: &RawResult,
        check_name: String,
        category: CategoryId,
        status: EvaluationStatus,
    ) -> Self {
        Self {
            check_id: raw.check_id.clone(),
            check_name,
            category,
            status,
            issues: Vec::new(),
            raw_status: raw.status,
            error_message: raw.error_message.clone(),
            started_at: raw.started_at,
            ended_at: raw.ended_at,
            duration_ms: raw.duration_ms(),
            matched_rule: None,
            evaluation_error: None,
        }
    }

    pub(crate) fn for_definition(
        raw: &RawResult,
        def: &CheckDefinition,
        status: EvaluationStatus,
    ) -> Self {
        Self::skeleton(raw, def.name.clone(), def.category.clone(), status)
    }

    pub fn is_pass(&self) -> bool {
        self.status == EvaluationStatus::Pass
    }
}
