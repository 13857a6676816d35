//! Run reports: a JSON artifact for machines and a markdown summary for people.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::{EvaluationStatus, RunOutcome, RunStatus, Severity};
use crate::error::ReportError;

pub const SUMMARY_JSON: &str = "run_summary.json";
pub const SUMMARY_MD: &str = "run_summary.md";

/// Publishes a finished run somewhere outside the engine.
#[async_trait]
pub trait RunReporter: Send + Sync {
    async fn report(&self, outcome: &RunOutcome) -> Result<(), ReportError>;
}

/// Writes `run_summary.json` and `run_summary.md` into a directory.
#[derive(Debug, Clone)]
pub struct ArtifactReporter {
    dir: PathBuf,
}

impl ArtifactReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RunReporter for ArtifactReporter {
    async fn report(&self, outcome: &RunOutcome) -> Result<(), ReportError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ReportError::Write {
                path: self.dir.clone(),
                source,
            })?;

        let json = serde_json::to_string_pretty(outcome)?;
        write_artifact(&self.dir.join(SUMMARY_JSON), json).await?;
        write_artifact(&self.dir.join(SUMMARY_MD), render_run_summary_md(outcome)).await
    }
}

async fn write_artifact(path: &Path, content: String) -> Result<(), ReportError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Render the markdown summary of a run.
pub fn render_run_summary_md(outcome: &RunOutcome) -> String {
    let summary = &outcome.summary;
    let mut out = String::new();
    out.push_str("# Health Check Summary\n\n");
    out.push_str(&format!("- run: `{}`\n", summary.run_id));
    if let Some(target) = &summary.target {
        out.push_str(&format!("- target: {}\n", target));
    }
    out.push_str(&format!("- status: {}\n", summary.status));
    out.push_str(&format!("- duration: {}ms\n", summary.duration_ms()));

    if summary.status == RunStatus::Failed {
        out.push_str(&format!(
            "- failure: {}\n",
            summary.failure_reason.as_deref().unwrap_or("unknown")
        ));
    }

    if let Some(scores) = &outcome.scores {
        out.push_str(&format!("- overall score: {}/100\n\n", scores.overall));
        out.push_str("## Categories\n");
        out.push_str("| category | score | checks | passed | weight |\n");
        out.push_str("|---|---|---|---|---|\n");
        for c in &scores.categories {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                c.category, c.value, c.checks_executed, c.checks_passed, c.weight
            ));
        }
    }
    out.push('\n');

    let counts = &summary.status_counts;
    out.push_str("## Checks\n");
    out.push_str(&format!(
        "- pass: {}\n- warning: {}\n- fail: {}\n\n",
        counts.pass, counts.warning, counts.fail
    ));

    let issues = &summary.issue_counts;
    if issues.total() > 0 {
        out.push_str("## Issues\n");
        for severity in Severity::ALL {
            out.push_str(&format!("- {}: {}\n", severity, issues.get(severity)));
        }
        out.push('\n');

        for result in outcome
            .results
            .iter()
            .filter(|r| r.status != EvaluationStatus::Pass)
        {
            for issue in &result.issues {
                out.push_str(&format!(
                    "- [{}] `{}` {}: {}\n",
                    issue.severity, issue.check_id, issue.affected_object, issue.title
                ));
            }
        }
        out.push('\n');
    }

    if !summary.warnings.is_empty() {
        out.push_str("## Warnings\n");
        for w in &summary.warnings {
            out.push_str(&format!("- {}\n", w));
        }
    }
    out
}
