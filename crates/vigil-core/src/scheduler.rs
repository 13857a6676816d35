//! Bounded-concurrency check scheduler.
//!
//! Every submitted definition yields exactly one [`RawResult`], whatever the
//! plugin does: return, fail, panic, hang, or get cancelled. A semaphore
//! bounds concurrency; the per-invocation deadline starts when a worker slot
//! is acquired. Each plugin future runs in its own task so that a panic is
//! caught at the join and a plugin that ignores its cancellation token can
//! be aborted and abandoned.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::domain::{CheckDefinition, ExecutionContext, RawResult, RawStatus};
use crate::metrics::RunMetrics;
use crate::obs;
use crate::plugin::{Invocation, PluginError, PluginOutput, PluginRegistry};

/// Scheduler errors. Per-check failures are never errors; they are results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid batch configuration: {0}")]
    InvalidConfig(String),
}

/// Limits for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of concurrently running invocations (>= 1).
    pub max_parallel: usize,
    /// Per-invocation timeout (> 0).
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            timeout: Duration::from_secs(60),
        }
    }
}

impl BatchConfig {
    pub fn new(max_parallel: usize, timeout: Duration) -> Self {
        Self {
            max_parallel,
            timeout,
        }
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_parallel == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of one invocation, emitted as `check.state` trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Pending,
    Running,
    Completed,
    Error,
    TimedOut,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Pending => "pending",
            InvocationState::Running => "running",
            InvocationState::Completed => "completed",
            InvocationState::Error => "error",
            InvocationState::TimedOut => "timed_out",
        }
    }
}

impl From<RawStatus> for InvocationState {
    fn from(status: RawStatus) -> Self {
        match status {
            RawStatus::Completed => InvocationState::Completed,
            RawStatus::Error => InvocationState::Error,
            RawStatus::TimedOut => InvocationState::TimedOut,
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs batches of plugin invocations.
#[derive(Debug, Clone)]
pub struct Scheduler {
    registry: Arc<PluginRegistry>,
    metrics: Option<Arc<RunMetrics>>,
}

impl Scheduler {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run every definition once and return one result per definition.
    ///
    /// Results are not ordered; correlate by `check_id`. The only error is an
    /// invalid `config`.
    #[instrument(skip_all, fields(checks = definitions.len(), max_parallel = config.max_parallel))]
    pub async fn run_batch(
        &self,
        definitions: &[Arc<CheckDefinition>],
        context: Arc<ExecutionContext>,
        config: &BatchConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawResult>, SchedulerError> {
        config.validate()?;
        if definitions.is_empty() {
            return Ok(Vec::new());
        }

        let sem = Arc::new(Semaphore::new(config.max_parallel));
        let mut ids = Vec::with_capacity(definitions.len());
        let mut tasks = Vec::with_capacity(definitions.len());

        for def in definitions {
            obs::emit_check_state(def.id.as_str(), InvocationState::Pending.as_str(), None);
            let worker = Worker {
                definition: Arc::clone(def),
                context: Arc::clone(&context),
                registry: Arc::clone(&self.registry),
                sem: Arc::clone(&sem),
                timeout: config.timeout,
                cancel: cancel.clone(),
            };
            ids.push(def.id.clone());
            tasks.push(tokio::spawn(worker.run()));
        }

        let joined = join_all(tasks).await;
        let results: Vec<RawResult> = ids
            .into_iter()
            .zip(joined)
            .map(|(check_id, joined)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(check_id = %check_id, error = %e, "scheduler worker failed");
                    let now = Utc::now();
                    RawResult::error(check_id, now, now, format!("scheduler worker failed: {e}"))
                }
            })
            .collect();

        if let Some(metrics) = &self.metrics {
            for r in &results {
                metrics.record_check(r.status);
            }
        }
        Ok(results)
    }
}

/// One definition's trip through the pool.
struct Worker {
    definition: Arc<CheckDefinition>,
    context: Arc<ExecutionContext>,
    registry: Arc<PluginRegistry>,
    sem: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
}

enum Outcome {
    Output(PluginOutput),
    Failed(String),
    TimedOut,
    Cancelled,
}

impl Worker {
    async fn run(self) -> RawResult {
        let check_id = self.definition.id.clone();
        let queued_at = Utc::now();

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return finish(RawResult::error(check_id, queued_at, Utc::now(), "cancelled before start"));
            }
            permit = Arc::clone(&self.sem).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return finish(RawResult::error(check_id, queued_at, Utc::now(), "worker pool closed"));
                }
            },
        };

        let started_at = Utc::now();
        if self.cancel.is_cancelled() {
            return finish(RawResult::error(check_id, started_at, Utc::now(), "cancelled before start"));
        }

        let plugin = match self.registry.resolve(&self.definition.plugin) {
            Some(plugin) => plugin,
            None => {
                let msg = format!("plugin not registered: {}", self.definition.plugin);
                return finish(RawResult::error(check_id, started_at, Utc::now(), msg));
            }
        };

        obs::emit_check_state(check_id.as_str(), InvocationState::Running.as_str(), None);

        let deadline = Instant::now() + self.timeout;
        let token = self.cancel.child_token();
        let invocation = Invocation {
            definition: Arc::clone(&self.definition),
            context: Arc::clone(&self.context),
            deadline,
            cancel: token.clone(),
        };

        let mut task = tokio::spawn(async move { plugin.invoke(&invocation).await });
        let abort = task.abort_handle();

        let outcome = tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(output)) => Outcome::Output(output),
                Ok(Err(PluginError::Cancelled)) => Outcome::Cancelled,
                Ok(Err(e)) => Outcome::Failed(e.to_string()),
                Err(e) => Outcome::Failed(join_error_message(e)),
            },
            _ = tokio::time::sleep_until(deadline) => {
                token.cancel();
                abort.abort();
                Outcome::TimedOut
            }
            _ = self.cancel.cancelled() => {
                token.cancel();
                abort.abort();
                Outcome::Cancelled
            }
        };

        let ended_at = Utc::now();
        let result = match outcome {
            Outcome::Output(output) => RawResult::completed(
                check_id,
                started_at,
                ended_at,
                output.fields,
                output.findings,
            ),
            Outcome::Failed(msg) => RawResult::error(check_id, started_at, ended_at, msg),
            Outcome::TimedOut => RawResult::timed_out(
                check_id,
                started_at,
                ended_at,
                format!("deadline of {}ms exceeded", self.timeout.as_millis()),
            ),
            Outcome::Cancelled => RawResult::error(check_id, started_at, ended_at, "cancelled"),
        };
        finish(result)
    }
}

fn finish(result: RawResult) -> RawResult {
    let state = InvocationState::from(result.status);
    obs::emit_check_state(
        result.check_id.as_str(),
        state.as_str(),
        result.error_message.as_deref(),
    );
    result
}

fn join_error_message(e: JoinError) -> String {
    if e.is_cancelled() {
        return "plugin task cancelled".to_string();
    }
    let payload = e.into_panic();
    format!("plugin panicked: {}", panic_message(&*payload))
}

/// Text of a panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
