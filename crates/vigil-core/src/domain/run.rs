//! Run summary and outcome: what one orchestrated run produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use vigil_state::{RunId, RunStatus};

use crate::domain::check::{CategoryId, Severity};
use crate::domain::evaluated::{EvaluatedResult, EvaluationStatus};
use crate::domain::issue::IssueCounts;
use crate::scoring::ScoreReport;

/// Exit code for a clean run.
pub const EXIT_OK: i32 = 0;
/// Exit code when issues at or above the threshold were raised.
pub const EXIT_ISSUES: i32 = 1;
/// Exit code when the run itself failed.
pub const EXIT_RUN_FAILED: i32 = 2;

/// Evaluated results by verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pass: u32,
    pub warning: u32,
    pub fail: u32,
}

impl StatusCounts {
    pub fn from_results(results: &[EvaluatedResult]) -> Self {
        let mut counts = Self::default();
        for r in results {
            let slot = match r.status {
                EvaluationStatus::Pass => &mut counts.pass,
                EvaluationStatus::Warning => &mut counts.warning,
                EvaluationStatus::Fail => &mut counts.fail,
            };
            *slot = slot.saturating_add(1);
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.pass
            .saturating_add(self.warning)
            .saturating_add(self.fail)
    }
}

/// Summary of one run, suitable for persistence and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Definitions submitted to the scheduler.
    pub checks_scheduled: u32,
    pub status_counts: StatusCounts,
    pub issue_counts: IssueCounts,
    /// `None` when the run failed before scoring.
    pub overall_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Non-fatal problems (persistence, reporting, defaulted category weights).
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitions_digest: Option<String>,
    /// Category filter the run was started with; empty means all.
    #[serde(default)]
    pub categories: Vec<CategoryId>,
}

impl RunSummary {
    /// A run that stopped before any check was scheduled.
    pub fn failed(
        run_id: RunId,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
        categories: Vec<CategoryId>,
    ) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            target: None,
            started_at,
            finished_at: Utc::now(),
            checks_scheduled: 0,
            status_counts: StatusCounts::default(),
            issue_counts: IssueCounts::default(),
            overall_score: None,
            failure_reason: Some(reason.into()),
            warnings: Vec::new(),
            definitions_digest: None,
            categories,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Process exit code for this run.
    ///
    /// `0` clean, `1` at least one issue at or above `fail_on`, `2` run failed.
    pub fn exit_code(&self, fail_on: Severity) -> i32 {
        match self.status {
            RunStatus::Failed => EXIT_RUN_FAILED,
            RunStatus::Completed if self.issue_counts.at_or_above(fail_on) > 0 => EXIT_ISSUES,
            RunStatus::Completed => EXIT_OK,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub results: Vec<EvaluatedResult>,
    /// Absent when the run failed before scoring.
    pub scores: Option<ScoreReport>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.summary.status == RunStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_with(counts: IssueCounts) -> RunSummary {
        let mut s = RunSummary::failed(RunId::from("r"), Utc::now(), "x", vec![]);
        s.status = RunStatus::Completed;
        s.failure_reason = None;
        s.issue_counts = counts;
        s
    }

    #[test]
    fn exit_code_zero_when_clean() {
        assert_eq!(
            completed_with(IssueCounts::default()).exit_code(Severity::Critical),
            EXIT_OK
        );
    }

    #[test]
    fn exit_code_respects_threshold() {
        let summary = completed_with(IssueCounts {
            high: 2,
            ..Default::default()
        });
        assert_eq!(summary.exit_code(Severity::Critical), EXIT_OK);
        assert_eq!(summary.exit_code(Severity::High), EXIT_ISSUES);
        assert_eq!(summary.exit_code(Severity::Low), EXIT_ISSUES);
    }

    #[test]
    fn exit_code_two_when_run_failed() {
        let summary = RunSummary::failed(RunId::from("r"), Utc::now(), "discovery down", vec![]);
        assert_eq!(summary.exit_code(Severity::Low), EXIT_RUN_FAILED);
        assert_eq!(summary.overall_score, None);
    }
}
