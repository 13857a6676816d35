//! Run recorder: maps a finished [`RunOutcome`] onto `RunStore` records.
//!
//! Persistence never fails a run. Every write that goes wrong is logged and
//! returned as a warning string for the run summary.

use vigil_state::{CategoryScoreRecord, CheckResultRecord, IssueRecord, RunRecord, RunStore};

use crate::domain::{EvaluatedResult, Issue, RunOutcome};
use crate::scoring::CategoryScore;

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

pub fn run_record(outcome: &RunOutcome) -> RunRecord {
    let s = &outcome.summary;
    RunRecord {
        run_id: s.run_id.clone(),
        status: s.status,
        started_at: s.started_at,
        finished_at: s.finished_at,
        overall_score: s.overall_score,
        definitions_digest: s.definitions_digest.clone(),
        summary: to_json(s),
    }
}

pub fn result_record(result: &EvaluatedResult) -> CheckResultRecord {
    CheckResultRecord {
        check_id: result.check_id.to_string(),
        category: result.category.to_string(),
        status: result.status.as_str().to_string(),
        raw_status: result.raw_status.to_string(),
        started_at: result.started_at,
        ended_at: result.ended_at,
        duration_ms: result.duration_ms,
        issue_count: u32::try_from(result.issues.len()).unwrap_or(u32::MAX),
        payload: to_json(result),
    }
}

pub fn issue_record(issue: &Issue) -> IssueRecord {
    IssueRecord {
        check_id: issue.check_id.to_string(),
        category: issue.category.to_string(),
        severity: issue.severity.as_str().to_string(),
        title: issue.title.clone(),
        description: issue.description.clone(),
        affected_object: issue.affected_object.clone(),
        evidence: issue.evidence.clone(),
    }
}

pub fn score_record(score: &CategoryScore) -> CategoryScoreRecord {
    CategoryScoreRecord {
        category: score.category.to_string(),
        value: score.value,
        checks_executed: score.checks_executed,
        checks_passed: score.checks_passed,
        weight: score.weight,
        payload: to_json(score),
    }
}

/// Persist a run. Returns one warning per failed write.
///
/// Child rows are only attempted once the run row is saved.
pub async fn persist_run(store: &dyn RunStore, outcome: &RunOutcome) -> Vec<String> {
    let run_id = &outcome.summary.run_id;
    let mut warnings = Vec::new();

    if let Err(e) = store.save_run(run_record(outcome)).await {
        crate::obs::emit_persist_error(run_id.as_str(), "run", &e);
        warnings.push(format!("failed to persist run: {e}"));
        return warnings;
    }

    let results: Vec<_> = outcome.results.iter().map(result_record).collect();
    if !results.is_empty() {
        if let Err(e) = store.save_results(run_id, results).await {
            crate::obs::emit_persist_error(run_id.as_str(), "results", &e);
            warnings.push(format!("failed to persist results: {e}"));
        }
    }

    let issues: Vec<_> = outcome
        .results
        .iter()
        .flat_map(|r| r.issues.iter())
        .map(issue_record)
        .collect();
    if !issues.is_empty() {
        if let Err(e) = store.save_issues(run_id, issues).await {
            crate::obs::emit_persist_error(run_id.as_str(), "issues", &e);
            warnings.push(format!("failed to persist issues: {e}"));
        }
    }

    if let Some(scores) = &outcome.scores {
        let records: Vec<_> = scores.categories.iter().map(score_record).collect();
        if !records.is_empty() {
            if let Err(e) = store.save_scores(run_id, records).await {
                crate::obs::emit_persist_error(run_id.as_str(), "scores", &e);
                warnings.push(format!("failed to persist scores: {e}"));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CategoryId, CheckId, EvaluationStatus, RawStatus, RunId, RunStatus, RunSummary, Severity,
    };
    use chrono::Utc;
    use vigil_state::fakes::{FailingRunStore, MemoryRunStore};

    fn outcome() -> RunOutcome {
        let issue = Issue {
            check_id: CheckId::from("disk_free"),
            category: CategoryId::from("storage"),
            severity: Severity::Medium,
            title: "disk low".to_string(),
            description: "below 10%".to_string(),
            affected_object: "/var".to_string(),
            evidence: Some("7%".to_string()),
        };
        let now = Utc::now();
        let result = EvaluatedResult {
            check_id: CheckId::from("disk_free"),
            check_name: "Disk free".to_string(),
            category: CategoryId::from("storage"),
            status: EvaluationStatus::Warning,
            issues: vec![issue],
            raw_status: RawStatus::Completed,
            error_message: None,
            started_at: now,
            ended_at: now,
            duration_ms: 0,
            matched_rule: Some(1),
            evaluation_error: None,
        };
        let mut summary = RunSummary::failed(RunId::from("run-rec"), now, "x", vec![]);
        summary.status = RunStatus::Completed;
        summary.failure_reason = None;
        RunOutcome {
            summary,
            results: vec![result],
            scores: None,
        }
    }

    #[tokio::test]
    async fn persists_run_results_and_issues() {
        let store = MemoryRunStore::new();
        let warnings = persist_run(&store, &outcome()).await;
        assert!(warnings.is_empty());

        let id = RunId::from("run-rec");
        let run = store.get_run(&id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        let results = store.get_results(&id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, "warning");
        assert_eq!(results[0].raw_status, "completed");
        assert_eq!(results[0].issue_count, 1);

        let issues = store.get_issues(&id).await.unwrap();
        assert_eq!(issues[0].severity, "medium");
        assert_eq!(issues[0].evidence.as_deref(), Some("7%"));
        assert!(store.get_scores(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_store_yields_single_warning() {
        let store = FailingRunStore::new("disk full");
        let warnings = persist_run(&store, &outcome()).await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("failed to persist run"));
    }

    #[tokio::test]
    async fn child_row_failures_each_warn_and_keep_the_run_row() {
        let store = FailingRunStore::child_rows("table locked");
        let warnings = persist_run(&store, &outcome()).await;

        assert_eq!(
            warnings,
            vec![
                "failed to persist results: storage backend error: table locked".to_string(),
                "failed to persist issues: storage backend error: table locked".to_string(),
            ]
        );
        let run = store.get_run(&RunId::from("run-rec")).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }
}
