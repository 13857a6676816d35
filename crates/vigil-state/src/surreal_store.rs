//! SurrealDB-backed RunStore implementation
//!
//! Uses the row types in `schema` for persistence, converting to/from
//! `storage_traits` records at the boundary.

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{DbCategoryScore, DbCheckResult, DbIssue, DbRun};
use crate::storage_traits::{
    CategoryScoreRecord, CheckResultRecord, IssueRecord, RunId, RunRecord, RunStore,
    StorageResult,
};

const NAMESPACE: &str = "vigil";
const DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".vigil/db";

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`RunStore`].
pub struct SurrealRunStore {
    db: Surreal<Any>,
}

impl SurrealRunStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `vigil/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let store = Self::connect("mem://").await?;
        info!("SurrealRunStore connected (in-memory)");
        Ok(store)
    }

    /// Connect to an explicit endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Uses `SURREALDB_URL` when set, otherwise local persistence under
    /// `.vigil/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            let store = Self::connect(&url).await?;
            info!("SurrealRunStore connected ({})", url);
            return Ok(store);
        }

        std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                LOCAL_DB_PATH, e
            ))
        })?;
        let url = format!("surrealkv://{}", LOCAL_DB_PATH);
        info!("No SURREALDB_URL found, using local persistence: {}", url);
        Self::connect(&url).await
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_run(&self, rid: &str) -> StorageResult<Option<DbRun>> {
        let rid_owned = rid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM runs WHERE run_id = $rid")
            .bind(("rid", rid_owned))
            .await
            .map_err(backend)?;

        let rows: Vec<DbRun> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    async fn require_run(&self, run_id: &RunId) -> StorageResult<DbRun> {
        self.fetch_run(&run_id.0)
            .await?
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    /// Next insertion sequence number for a child table of `runs`.
    async fn next_seq(&self, table: &'static str, run_id: &RunId) -> StorageResult<u64> {
        let sql = format!("SELECT count() FROM {table} WHERE run_id = $rid GROUP ALL");
        let mut res = self
            .db
            .query(sql)
            .bind(("rid", run_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<CountRow> = res.take(0).map_err(backend)?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }

    async fn select_children<T>(&self, table: &'static str, run_id: &RunId) -> StorageResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        self.require_run(run_id).await?;

        let sql = format!("SELECT * FROM {table} WHERE run_id = $rid ORDER BY seq ASC");
        let mut res = self
            .db
            .query(sql)
            .bind(("rid", run_id.0.clone()))
            .await
            .map_err(backend)?;
        res.take(0).map_err(backend)
    }
}

#[async_trait]
impl RunStore for SurrealRunStore {
    async fn save_run(&self, run: RunRecord) -> StorageResult<()> {
        if self.fetch_run(&run.run_id.0).await?.is_some() {
            return Err(StorageError::DuplicateRun {
                run_id: run.run_id.0.clone(),
            });
        }

        debug!(run_id = %run.run_id, "saving run");
        let _created: Option<DbRun> = self
            .db
            .create("runs")
            .content(DbRun::from_record(run))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn save_results(
        &self,
        run_id: &RunId,
        results: Vec<CheckResultRecord>,
    ) -> StorageResult<()> {
        self.require_run(run_id).await?;
        let start = self.next_seq("check_results", run_id).await?;

        for (offset, record) in results.into_iter().enumerate() {
            let row = DbCheckResult::new(run_id, start + offset as u64, record);
            let _created: Option<DbCheckResult> = self
                .db
                .create("check_results")
                .content(row)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn save_issues(&self, run_id: &RunId, issues: Vec<IssueRecord>) -> StorageResult<()> {
        self.require_run(run_id).await?;
        let start = self.next_seq("issues", run_id).await?;

        for (offset, record) in issues.into_iter().enumerate() {
            let row = DbIssue::new(run_id, start + offset as u64, record);
            let _created: Option<DbIssue> = self
                .db
                .create("issues")
                .content(row)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn save_scores(
        &self,
        run_id: &RunId,
        scores: Vec<CategoryScoreRecord>,
    ) -> StorageResult<()> {
        self.require_run(run_id).await?;
        let start = self.next_seq("category_scores", run_id).await?;

        for (offset, record) in scores.into_iter().enumerate() {
            let row = DbCategoryScore::new(run_id, start + offset as u64, record);
            let _created: Option<DbCategoryScore> = self
                .db
                .create("category_scores")
                .content(row)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let row = self.require_run(run_id).await?;
        row.into_record().map_err(|reason| StorageError::CorruptRecord {
            table: "runs".to_string(),
            reason,
        })
    }

    async fn list_runs(&self, limit: Option<usize>) -> StorageResult<Vec<RunRecord>> {
        let mut res = match limit {
            Some(n) => self
                .db
                .query("SELECT * FROM runs ORDER BY started_at DESC LIMIT $n")
                .bind(("n", n as i64))
                .await
                .map_err(backend)?,
            None => self
                .db
                .query("SELECT * FROM runs ORDER BY started_at DESC")
                .await
                .map_err(backend)?,
        };
        let rows: Vec<DbRun> = res.take(0).map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                row.into_record().map_err(|reason| StorageError::CorruptRecord {
                    table: "runs".to_string(),
                    reason,
                })
            })
            .collect()
    }

    async fn get_results(&self, run_id: &RunId) -> StorageResult<Vec<CheckResultRecord>> {
        let rows: Vec<DbCheckResult> = self.select_children("check_results", run_id).await?;
        Ok(rows.into_iter().map(DbCheckResult::into_record).collect())
    }

    async fn get_issues(&self, run_id: &RunId) -> StorageResult<Vec<IssueRecord>> {
        let rows: Vec<DbIssue> = self.select_children("issues", run_id).await?;
        Ok(rows.into_iter().map(DbIssue::into_record).collect())
    }

    async fn get_scores(&self, run_id: &RunId) -> StorageResult<Vec<CategoryScoreRecord>> {
        let rows: Vec<DbCategoryScore> = self.select_children("category_scores", run_id).await?;
        Ok(rows.into_iter().map(DbCategoryScore::into_record).collect())
    }
}
