//! Vigil Core Library
//!
//! Health-check engine: runs check plugins against a discovered target under
//! a bounded worker pool, judges their output with declarative rules, scores
//! the run by category, and persists and reports the outcome.

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod plugin;
pub mod recording;
pub mod reporting;
pub mod rules;
pub mod scheduler;
pub mod scoring;
pub mod sources;
pub mod telemetry;

pub use config::EngineConfig;
pub use domain::{
    CategoryId, CheckDefinition, CheckId, EvaluatedResult, EvaluationStatus, ExecutionContext,
    FieldMap, FieldSchema, FieldType, FieldValue, Issue, IssueCounts, PluginRef, RawResult,
    RawStatus, RunId, RunOutcome, RunStatus, RunSummary, Severity, StatusCounts,
};
pub use error::{ConfigError, DefinitionError, DiscoveryError, ReportError, Result, VigilError};
pub use metrics::RunMetrics;
pub use orchestrator::Orchestrator;
pub use plugin::{
    CheckPlugin, CommandRunner, Invocation, PluginError, PluginOutput, PluginRegistry,
};
pub use recording::persist_run;
pub use reporting::{render_run_summary_md, ArtifactReporter, RunReporter};
pub use rules::{Evaluator, RuleEvaluationError, RuleLoadError, RuleSet};
pub use scheduler::{BatchConfig, InvocationState, Scheduler, SchedulerError};
pub use scoring::{CategoryScore, ScoreReport, Scorer, ScoringConfig, SeverityWeights};
pub use sources::{
    DefinitionFilter, DefinitionSource, Discovery, StaticDefinitionSource, StaticDiscovery,
};
