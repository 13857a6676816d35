//! Vigil domain model.
//!
//! Checks, the execution context they run against, the raw and evaluated
//! results they produce, and the run summary that ties a run together.

pub mod check;
pub mod context;
pub mod evaluated;
pub mod issue;
pub mod result;
pub mod run;

pub use check::{CategoryId, CheckDefinition, CheckId, FieldSchema, FieldType, PluginRef, Severity};
pub use context::ExecutionContext;
pub use evaluated::{EvaluatedResult, EvaluationStatus};
pub use issue::{Issue, IssueCounts};
pub use result::{FieldMap, FieldValue, RawResult, RawStatus};
pub use run::{RunId, RunOutcome, RunStatus, RunSummary, StatusCounts};
