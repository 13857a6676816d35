//! Read-only snapshot of the target handed to every plugin invocation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inventory snapshot for one run. Shared as `Arc<ExecutionContext>`;
/// plugins only ever see `&ExecutionContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub run_id: String,
    /// Human-readable name of the inspected system.
    pub target: String,
    pub collected_at: DateTime<Utc>,
    /// Discovered topology, as produced by discovery.
    pub inventory: serde_json::Value,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            target: target.into(),
            collected_at: Utc::now(),
            inventory: serde_json::Value::Null,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_inventory(mut self, inventory: serde_json::Value) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}
