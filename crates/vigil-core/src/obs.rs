//! Structured observability hooks for Vigil run lifecycle events.
//!
//! This module provides:
//! - a run-scoped tracing span that carries the run id into every component
//! - emission functions for key lifecycle events: start, phase changes,
//!   per-check state transitions, scoring, persistence problems, finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`); per-check
//! transitions are `debug!`.

use tracing::{debug, info, warn, Span};

/// Create the span a whole run executes in.
///
/// ```ignore
/// orchestrator_work().instrument(run_span("run-12345")).await;
/// // every event inside carries run_id = "run-12345"
/// ```
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("vigil.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, categories: &[String]) {
    info!(
        event = "run.started",
        run_id = %run_id,
        categories = %categories.join(","),
    );
}

/// Emit event: the orchestrator entered a phase.
pub fn emit_phase(phase: &str) {
    info!(event = "run.phase", phase = %phase);
}

/// Emit event: a check invocation changed state.
pub fn emit_check_state(check_id: &str, state: &str, detail: Option<&str>) {
    match detail {
        Some(detail) => debug!(event = "check.state", check_id = %check_id, state = %state, detail = %detail),
        None => debug!(event = "check.state", check_id = %check_id, state = %state),
    }
}

/// Emit event: scores computed.
pub fn emit_score_computed(overall: u32, categories: usize, defaulted: usize) {
    info!(
        event = "score.computed",
        overall = overall,
        categories = categories,
        defaulted_categories = defaulted,
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(
    run_id: &str,
    status: &str,
    duration_ms: u64,
    checks: u32,
    issues: u32,
    overall: Option<u32>,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        status = %status,
        duration_ms = duration_ms,
        checks = checks,
        issues = issues,
        overall = ?overall,
    );
}

/// Emit event: the run failed before scoring.
pub fn emit_run_failed(run_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, reason = %reason);
}

/// Emit event: persisting part of a run failed (warning level).
pub fn emit_persist_error(run_id: &str, what: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.persist_error", run_id = %run_id, what = %what, error = %error);
}

/// Emit event: writing the run report failed (warning level).
pub fn emit_report_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.report_error", run_id = %run_id, error = %error);
}
