//! Storage trait definitions for Vigil
//!
//! `RunStore` persists the outcome of one health-check run: the run row, one
//! row per evaluated check, the issues raised, and the per-category scores.
//!
//! Records here are storage-shaped: statuses and severities are plain strings
//! and rich payloads travel as `serde_json::Value`, so the schema does not
//! depend on the engine's domain types. In-memory fakes live in `fakes`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Unique identifier for a health-check run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        RunId(s.to_string())
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Overall health score; absent for failed runs
    pub overall_score: Option<u32>,
    /// Digest of the check definitions the run executed
    pub definitions_digest: Option<String>,
    /// Full run summary as produced by the engine
    pub summary: serde_json::Value,
}

/// One evaluated check within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResultRecord {
    pub check_id: String,
    pub category: String,
    /// "pass" | "warning" | "fail"
    pub status: String,
    /// "completed" | "error" | "timed_out"
    pub raw_status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub issue_count: u32,
    /// Full evaluated result
    pub payload: serde_json::Value,
}

/// One issue raised within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub check_id: String,
    pub category: String,
    /// "critical" | "high" | "medium" | "low"
    pub severity: String,
    pub title: String,
    pub description: String,
    pub affected_object: String,
    pub evidence: Option<String>,
}

/// Score of one category within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScoreRecord {
    pub category: String,
    pub value: u32,
    pub checks_executed: u32,
    pub checks_passed: u32,
    pub weight: f64,
    /// Full category breakdown
    pub payload: serde_json::Value,
}

/// Persistence for health-check runs.
///
/// Guarantees:
/// - A run is written once (`save_run` on an existing id is `DuplicateRun`).
/// - Results, issues and scores can only be attached to a saved run.
/// - Getters return rows in the order they were saved.
/// - `list_runs` returns newest first (by `started_at`).
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Save a run row.
    async fn save_run(&self, run: RunRecord) -> StorageResult<()>;

    /// Attach evaluated check results to a saved run.
    async fn save_results(
        &self,
        run_id: &RunId,
        results: Vec<CheckResultRecord>,
    ) -> StorageResult<()>;

    /// Attach issues to a saved run.
    async fn save_issues(&self, run_id: &RunId, issues: Vec<IssueRecord>) -> StorageResult<()>;

    /// Attach category scores to a saved run.
    async fn save_scores(
        &self,
        run_id: &RunId,
        scores: Vec<CategoryScoreRecord>,
    ) -> StorageResult<()>;

    /// Retrieve a run row by id.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// List runs, newest first, optionally limited.
    async fn list_runs(&self, limit: Option<usize>) -> StorageResult<Vec<RunRecord>>;

    /// Retrieve the check results of a run.
    async fn get_results(&self, run_id: &RunId) -> StorageResult<Vec<CheckResultRecord>>;

    /// Retrieve the issues of a run.
    async fn get_issues(&self, run_id: &RunId) -> StorageResult<Vec<IssueRecord>>;

    /// Retrieve the category scores of a run.
    async fn get_scores(&self, run_id: &RunId) -> StorageResult<Vec<CategoryScoreRecord>>;
}
