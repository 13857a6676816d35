//! Run orchestration: discovery, definition loading, scheduling, evaluation,
//! scoring, persistence and reporting, in that order.
//!
//! `Orchestrator::run` always yields a [`RunOutcome`]. Failures before
//! scheduling produce a `Failed` run with no scores; persistence and
//! reporting failures become warnings on an otherwise completed run. A panic
//! in any collaborator is caught and handled the same way.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use vigil_state::RunStore;

use crate::config::EngineConfig;
use crate::domain::{
    IssueCounts, RawResult, RunId, RunOutcome, RunStatus, RunSummary, StatusCounts,
};
use crate::error::VigilError;
use crate::metrics::RunMetrics;
use crate::obs;
use crate::plugin::PluginRegistry;
use crate::recording::persist_run;
use crate::reporting::RunReporter;
use crate::rules::{definitions_digest, Evaluator};
use crate::scheduler::{panic_message, Scheduler};
use crate::scoring::Scorer;
use crate::sources::{DefinitionSource, Discovery};

/// Drives one health-check run end to end.
pub struct Orchestrator {
    config: EngineConfig,
    discovery: Arc<dyn Discovery>,
    definitions: Arc<dyn DefinitionSource>,
    registry: Arc<PluginRegistry>,
    store: Option<Arc<dyn RunStore>>,
    reporter: Option<Arc<dyn RunReporter>>,
    metrics: Arc<RunMetrics>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        discovery: Arc<dyn Discovery>,
        definitions: Arc<dyn DefinitionSource>,
        registry: PluginRegistry,
    ) -> Self {
        Self {
            config,
            discovery,
            definitions,
            registry: Arc::new(registry),
            store: None,
            reporter: None,
            metrics: Arc::new(RunMetrics::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Execute one run under a fresh run id.
    pub async fn run(&self, cancel: &CancellationToken) -> RunOutcome {
        let run_id = RunId::new();
        let span = obs::run_span(run_id.as_str());
        self.run_with_id(run_id, cancel).instrument(span).await
    }

    async fn run_with_id(&self, run_id: RunId, cancel: &CancellationToken) -> RunOutcome {
        let started_at = Utc::now();
        let categories: Vec<String> = self
            .config
            .categories
            .iter()
            .map(|c| c.to_string())
            .collect();
        obs::emit_run_started(run_id.as_str(), &categories);

        let executed = AssertUnwindSafe(self.execute(&run_id, started_at, cancel))
            .catch_unwind()
            .await;
        let mut outcome = match executed {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.failed(&run_id, started_at, failure_reason(&e)),
            Err(payload) => {
                let reason = format!("run panicked: {}", panic_message(&*payload));
                self.failed(&run_id, started_at, reason)
            }
        };

        if let Some(store) = &self.store {
            obs::emit_phase("persist");
            let persisted = AssertUnwindSafe(persist_run(store.as_ref(), &outcome))
                .catch_unwind()
                .await;
            match persisted {
                Ok(warnings) => outcome.summary.warnings.extend(warnings),
                Err(payload) => {
                    let msg = panic_message(&*payload);
                    obs::emit_persist_error(run_id.as_str(), "run", &msg);
                    outcome
                        .summary
                        .warnings
                        .push(format!("run store panicked: {msg}"));
                }
            }
        }

        if let Some(reporter) = &self.reporter {
            obs::emit_phase("report");
            let reported = AssertUnwindSafe(reporter.report(&outcome))
                .catch_unwind()
                .await;
            let warning = match reported {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    obs::emit_report_error(run_id.as_str(), &e);
                    Some(format!("failed to write report: {e}"))
                }
                Err(payload) => {
                    let msg = panic_message(&*payload);
                    obs::emit_report_error(run_id.as_str(), &msg);
                    Some(format!("reporter panicked: {msg}"))
                }
            };
            outcome.summary.warnings.extend(warning);
        }

        let summary = &outcome.summary;
        self.metrics.add_issues(u64::from(summary.issue_counts.total()));
        self.metrics.inc_runs_finished();
        self.metrics.flush();
        obs::emit_run_finished(
            run_id.as_str(),
            summary.status.as_str(),
            summary.duration_ms(),
            summary.status_counts.total(),
            summary.issue_counts.total(),
            summary.overall_score,
        );
        outcome
    }

    fn failed(&self, run_id: &RunId, started_at: DateTime<Utc>, reason: String) -> RunOutcome {
        obs::emit_run_failed(run_id.as_str(), &reason);
        RunOutcome {
            summary: RunSummary::failed(
                run_id.clone(),
                started_at,
                reason,
                self.config.categories.clone(),
            ),
            results: Vec::new(),
            scores: None,
        }
    }

    async fn execute(
        &self,
        run_id: &RunId,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, VigilError> {
        self.config.validate()?;

        obs::emit_phase("discovery");
        let context = self.discovery.discover(run_id).await?;
        let target = context.target.clone();

        obs::emit_phase("load");
        let definitions = self.definitions.load(&self.config.filter()).await?;
        let digest = definitions_digest(&definitions);

        obs::emit_phase("schedule");
        let raws = Scheduler::new(Arc::clone(&self.registry))
            .with_metrics(Arc::clone(&self.metrics))
            .run_batch(
                &definitions,
                Arc::new(context),
                &self.config.batch_config(),
                cancel,
            )
            .await?;

        obs::emit_phase("evaluate");
        let expanded: Vec<RawResult> = raws.into_iter().flat_map(RawResult::expand).collect();
        let results = Evaluator::new().evaluate_batch(&expanded, &definitions);

        obs::emit_phase("score");
        let scores = Scorer::new(self.config.scoring.clone()).score(&results);
        obs::emit_score_computed(
            scores.overall,
            scores.categories.len(),
            scores.defaulted_categories.len(),
        );

        // Only worth a warning when the caller configured weights at all.
        let warnings: Vec<String> = if self.config.scoring.category_weights.is_empty() {
            Vec::new()
        } else {
            scores
                .defaulted_categories
                .iter()
                .map(|c| format!("category {c} scored with default weight 1"))
                .collect()
        };

        let summary = RunSummary {
            run_id: run_id.clone(),
            status: RunStatus::Completed,
            target: Some(target),
            started_at,
            finished_at: Utc::now(),
            checks_scheduled: u32::try_from(definitions.len()).unwrap_or(u32::MAX),
            status_counts: StatusCounts::from_results(&results),
            issue_counts: IssueCounts::from_issues(results.iter().flat_map(|r| r.issues.iter())),
            overall_score: Some(scores.overall),
            failure_reason: None,
            warnings,
            definitions_digest: Some(digest),
            categories: self.config.categories.clone(),
        };

        Ok(RunOutcome {
            summary,
            results,
            scores: Some(scores),
        })
    }
}

fn failure_reason(error: &VigilError) -> String {
    match error {
        VigilError::Discovery(e) => format!("discovery failed: {e}"),
        VigilError::Definition(e) => format!("definition loading failed: {e}"),
        other => other.to_string(),
    }
}
