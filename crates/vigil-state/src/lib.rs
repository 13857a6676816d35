//! Vigil-State: run persistence for Vigil
//!
//! This crate is the storage collaborator of the health-check engine. The
//! engine hands it one finished run at a time (run row, evaluated results,
//! issues, category scores); it never reads back during a run.
//!
//! ## Key Components
//!
//! - `RunStore`: async, backend-agnostic persistence trait
//! - `SurrealRunStore`: SurrealDB implementation (`mem://`, `surrealkv://`, remote)
//! - `fakes::MemoryRunStore`: in-memory implementation for tests

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use storage_traits::{
    CategoryScoreRecord, CheckResultRecord, IssueRecord, RunId, RunRecord, RunStatus, RunStore,
    StorageResult,
};
pub use surreal_store::SurrealRunStore;

/// Result type for vigil-state operations
pub type Result<T> = std::result::Result<T, StateError>;
