//! Row definitions for Vigil SurrealDB tables
//!
//! Tables:
//! - runs: one row per health-check run
//! - check_results: evaluated checks, keyed by (run_id, seq)
//! - issues: issues raised, keyed by (run_id, seq)
//! - category_scores: per-category scores, keyed by (run_id, seq)
//!
//! Rows carry the `run_id` foreign key and an insertion `seq`; the trait-level
//! records in `storage_traits` do not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{
    CategoryScoreRecord, CheckResultRecord, IssueRecord, RunId, RunRecord, RunStatus,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// `runs` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbRun {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    /// "completed" | "failed"
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub finished_at: DateTime<Utc>,
    pub overall_score: Option<u32>,
    pub definitions_digest: Option<String>,
    pub summary: serde_json::Value,
}

impl DbRun {
    pub fn from_record(record: RunRecord) -> Self {
        Self {
            id: None,
            run_id: record.run_id.0,
            status: record.status.as_str().to_string(),
            started_at: record.started_at,
            finished_at: record.finished_at,
            overall_score: record.overall_score,
            definitions_digest: record.definitions_digest,
            summary: record.summary,
        }
    }

    /// Map back into a trait-level record; unknown statuses are corrupt rows.
    pub fn into_record(self) -> Result<RunRecord, String> {
        let status = match self.status.as_str() {
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            other => return Err(format!("unknown run status: {other}")),
        };
        Ok(RunRecord {
            run_id: RunId(self.run_id),
            status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            overall_score: self.overall_score,
            definitions_digest: self.definitions_digest,
            summary: self.summary,
        })
    }
}

/// `check_results` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCheckResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub seq: u64,
    pub check_id: String,
    pub category: String,
    pub status: String,
    pub raw_status: String,
    #[serde(with = "surreal_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub issue_count: u32,
    pub payload: serde_json::Value,
}

impl DbCheckResult {
    pub fn new(run_id: &RunId, seq: u64, r: CheckResultRecord) -> Self {
        Self {
            id: None,
            run_id: run_id.0.clone(),
            seq,
            check_id: r.check_id,
            category: r.category,
            status: r.status,
            raw_status: r.raw_status,
            started_at: r.started_at,
            ended_at: r.ended_at,
            duration_ms: r.duration_ms,
            issue_count: r.issue_count,
            payload: r.payload,
        }
    }

    pub fn into_record(self) -> CheckResultRecord {
        CheckResultRecord {
            check_id: self.check_id,
            category: self.category,
            status: self.status,
            raw_status: self.raw_status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_ms: self.duration_ms,
            issue_count: self.issue_count,
            payload: self.payload,
        }
    }
}

/// `issues` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub seq: u64,
    pub check_id: String,
    pub category: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub affected_object: String,
    pub evidence: Option<String>,
}

impl DbIssue {
    pub fn new(run_id: &RunId, seq: u64, i: IssueRecord) -> Self {
        Self {
            id: None,
            run_id: run_id.0.clone(),
            seq,
            check_id: i.check_id,
            category: i.category,
            severity: i.severity,
            title: i.title,
            description: i.description,
            affected_object: i.affected_object,
            evidence: i.evidence,
        }
    }

    pub fn into_record(self) -> IssueRecord {
        IssueRecord {
            check_id: self.check_id,
            category: self.category,
            severity: self.severity,
            title: self.title,
            description: self.description,
            affected_object: self.affected_object,
            evidence: self.evidence,
        }
    }
}

/// `category_scores` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCategoryScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub seq: u64,
    pub category: String,
    pub value: u32,
    pub checks_executed: u32,
    pub checks_passed: u32,
    pub weight: f64,
    pub payload: serde_json::Value,
}

impl DbCategoryScore {
    pub fn new(run_id: &RunId, seq: u64, s: CategoryScoreRecord) -> Self {
        Self {
            id: None,
            run_id: run_id.0.clone(),
            seq,
            category: s.category,
            value: s.value,
            checks_executed: s.checks_executed,
            checks_passed: s.checks_passed,
            weight: s.weight,
            payload: s.payload,
        }
    }

    pub fn into_record(self) -> CategoryScoreRecord {
        CategoryScoreRecord {
            category: self.category,
            value: self.value,
            checks_executed: self.checks_executed,
            checks_passed: self.checks_passed,
            weight: self.weight,
            payload: self.payload,
        }
    }
}
