//! Atomic counters for Vigil runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`RunMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run). One instance is owned
//! by each orchestrator and shared with its scheduler by `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::RawStatus;

/// Lightweight atomic counters. No allocations, no locking.
#[derive(Debug, Default)]
pub struct RunMetrics {
    checks_executed: AtomicU64,
    checks_completed: AtomicU64,
    checks_errored: AtomicU64,
    checks_timed_out: AtomicU64,
    issues_raised: AtomicU64,
    runs_finished: AtomicU64,
}

impl RunMetrics {
    pub const fn new() -> Self {
        Self {
            checks_executed: AtomicU64::new(0),
            checks_completed: AtomicU64::new(0),
            checks_errored: AtomicU64::new(0),
            checks_timed_out: AtomicU64::new(0),
            issues_raised: AtomicU64::new(0),
            runs_finished: AtomicU64::new(0),
        }
    }

    /// Count one finished invocation by its outcome.
    pub fn record_check(&self, status: RawStatus) {
        self.checks_executed.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            RawStatus::Completed => &self.checks_completed,
            RawStatus::Error => &self.checks_errored,
            RawStatus::TimedOut => &self.checks_timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "checks_executed", status = %status, "counter incremented");
    }

    pub fn add_issues(&self, n: u64) {
        self.issues_raised.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "issues_raised", n, "counter incremented");
    }

    pub fn inc_runs_finished(&self) {
        self.runs_finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            checks_executed = self.checks_executed(),
            checks_completed = self.checks_completed(),
            checks_errored = self.checks_errored(),
            checks_timed_out = self.checks_timed_out(),
            issues_raised = self.issues_raised(),
            runs_finished = self.runs_finished(),
        );
    }

    pub fn checks_executed(&self) -> u64 {
        self.checks_executed.load(Ordering::Relaxed)
    }

    pub fn checks_completed(&self) -> u64 {
        self.checks_completed.load(Ordering::Relaxed)
    }

    pub fn checks_errored(&self) -> u64 {
        self.checks_errored.load(Ordering::Relaxed)
    }

    pub fn checks_timed_out(&self) -> u64 {
        self.checks_timed_out.load(Ordering::Relaxed)
    }

    pub fn issues_raised(&self) -> u64 {
        self.issues_raised.load(Ordering::Relaxed)
    }

    pub fn runs_finished(&self) -> u64 {
        self.runs_finished.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.checks_executed,
            &self.checks_completed,
            &self.checks_errored,
            &self.checks_timed_out,
            &self.issues_raised,
            &self.runs_finished,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
