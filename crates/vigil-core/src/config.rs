//! Engine configuration.
//!
//! An `EngineConfig` is built once (file, then CLI overrides) and threaded
//! through the orchestrator constructor. Nothing reads configuration from
//! process-wide state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{CategoryId, Severity};
use crate::error::ConfigError;
use crate::scheduler::BatchConfig;
use crate::scoring::ScoringConfig;
use crate::sources::DefinitionFilter;

pub const DEFAULT_MAX_PARALLEL: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Everything the engine needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_parallel: usize,
    pub timeout_secs: u64,
    /// Only run checks in these categories; empty runs all.
    pub categories: Vec<CategoryId>,
    pub scoring: ScoringConfig,
    /// Lowest severity that makes a completed run exit non-zero.
    pub fail_on: Severity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            categories: Vec::new(),
            scoring: ScoringConfig::default(),
            fail_on: Severity::Critical,
        }
    }
}

impl EngineConfig {
    /// Load from a `.toml` file, or JSON for any other extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let config: Self = if is_toml {
            toml::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.scoring.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::new(self.max_parallel, self.timeout())
    }

    pub fn filter(&self) -> DefinitionFilter {
        DefinitionFilter::categories(self.categories.clone())
    }
}
