//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryRunStore` satisfies the [`RunStore`] contract without any external
//! dependencies. `FailingRunStore` rejects every write (or only the child
//! rows of a run), for exercising the engine's non-fatal persistence path.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StoredRun {
    record: RunRecord,
    results: Vec<CheckResultRecord>,
    issues: Vec<IssueRecord>,
    scores: Vec<CategoryScoreRecord>,
}

/// In-memory run store backed by a `HashMap<RunId, StoredRun>`.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, StoredRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredRun>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_run<T>(
        &self,
        run_id: &RunId,
        f: impl FnOnce(&mut StoredRun) -> T,
    ) -> StorageResult<T> {
        let mut runs = self.lock();
        let run = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        Ok(f(run))
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn save_run(&self, run: RunRecord) -> StorageResult<()> {
        let mut runs = self.lock();
        if runs.contains_key(&run.run_id.0) {
            return Err(StorageError::DuplicateRun {
                run_id: run.run_id.0.clone(),
            });
        }
        runs.insert(
            run.run_id.0.clone(),
            StoredRun {
                record: run,
                results: Vec::new(),
                issues: Vec::new(),
                scores: Vec::new(),
            },
        );
        Ok(())
    }

    async fn save_results(
        &self,
        run_id: &RunId,
        results: Vec<CheckResultRecord>,
    ) -> StorageResult<()> {
        self.with_run(run_id, |run| run.results.extend(results))
    }

    async fn save_issues(&self, run_id: &RunId, issues: Vec<IssueRecord>) -> StorageResult<()> {
        self.with_run(run_id, |run| run.issues.extend(issues))
    }

    async fn save_scores(
        &self,
        run_id: &RunId,
        scores: Vec<CategoryScoreRecord>,
    ) -> StorageResult<()> {
        self.with_run(run_id, |run| run.scores.extend(scores))
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.with_run(run_id, |run| run.record.clone())
    }

    async fn list_runs(&self, limit: Option<usize>) -> StorageResult<Vec<RunRecord>> {
        let runs = self.lock();
        let mut records: Vec<RunRecord> = runs.values().map(|r| r.record.clone()).collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn get_results(&self, run_id: &RunId) -> StorageResult<Vec<CheckResultRecord>> {
        self.with_run(run_id, |run| run.results.clone())
    }

    async fn get_issues(&self, run_id: &RunId) -> StorageResult<Vec<IssueRecord>> {
        self.with_run(run_id, |run| run.issues.clone())
    }

    async fn get_scores(&self, run_id: &RunId) -> StorageResult<Vec<CategoryScoreRecord>> {
        self.with_run(run_id, |run| run.scores.clone())
    }
}

// ---------------------------------------------------------------------------
// FailingRunStore
// ---------------------------------------------------------------------------

/// A store whose operations fail with a backend error.
///
/// Built with [`FailingRunStore::child_rows`], run rows are kept and only
/// results, issues and scores are rejected.
#[derive(Debug)]
pub struct FailingRunStore {
    reason: String,
    runs: Option<MemoryRunStore>,
}

impl FailingRunStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            runs: None,
        }
    }

    /// Accept run rows, reject everything attached to them.
    pub fn child_rows(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            runs: Some(MemoryRunStore::new()),
        }
    }

    fn err<T>(&self) -> StorageResult<T> {
        Err(StorageError::Backend(self.reason.clone()))
    }
}

#[async_trait]
impl RunStore for FailingRunStore {
    async fn save_run(&self, run: RunRecord) -> StorageResult<()> {
        match &self.runs {
            Some(runs) => runs.save_run(run).await,
            None => self.err(),
        }
    }

    async fn save_results(
        &self,
        _run_id: &RunId,
        _results: Vec<CheckResultRecord>,
    ) -> StorageResult<()> {
        self.err()
    }

    async fn save_issues(&self, _run_id: &RunId, _issues: Vec<IssueRecord>) -> StorageResult<()> {
        self.err()
    }

    async fn save_scores(
        &self,
        _run_id: &RunId,
        _scores: Vec<CategoryScoreRecord>,
    ) -> StorageResult<()> {
        self.err()
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        match &self.runs {
            Some(runs) => runs.get_run(run_id).await,
            None => self.err(),
        }
    }

    async fn list_runs(&self, limit: Option<usize>) -> StorageResult<Vec<RunRecord>> {
        match &self.runs {
            Some(runs) => runs.list_runs(limit).await,
            None => self.err(),
        }
    }

    async fn get_results(&self, _run_id: &RunId) -> StorageResult<Vec<CheckResultRecord>> {
        self.err()
    }

    async fn get_issues(&self, _run_id: &RunId) -> StorageResult<Vec<IssueRecord>> {
        self.err()
    }

    async fn get_scores(&self, _run_id: &RunId) -> StorageResult<Vec<CategoryScoreRecord>> {
        self.err()
    }
}
