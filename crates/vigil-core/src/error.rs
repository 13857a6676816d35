//! Error taxonomy for Vigil.
//!
//! Each component has its own error; `VigilError` is the umbrella callers
//! can use when they do not care which component failed.

use std::path::PathBuf;

use crate::plugin::PluginError;
use crate::rules::RuleLoadError;
use crate::scheduler::SchedulerError;

/// Discovery could not produce an execution context. Fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to read inventory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid inventory {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("discovery unavailable: {0}")]
    Unavailable(String),
}

/// Check definitions could not be loaded. Fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to read definitions from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] RuleLoadError),
}

/// A reporter could not write its artifacts. Non-fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalid engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Vigil errors.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    RuleLoad(#[from] RuleLoadError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("storage error: {0}")]
    Storage(#[from] vigil_state::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for Vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;
