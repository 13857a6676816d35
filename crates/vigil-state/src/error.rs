//! Error types for vigil-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors surfaced through the [`RunStore`](crate::storage_traits::RunStore) trait
#[derive(Error, Debug)]
pub enum StorageError {
    /// No run with this id has been saved
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// A run with this id already exists; runs are written once
    #[error("run already exists: {run_id}")]
    DuplicateRun { run_id: String },

    /// A stored row could not be mapped back into a record
    #[error("corrupt record in {table}: {reason}")]
    CorruptRecord { table: String, reason: String },

    /// Backend (database, filesystem) failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
