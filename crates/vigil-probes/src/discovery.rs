//! Inventory discovery from a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use vigil_core::{Discovery, DiscoveryError, ExecutionContext, RunId};

/// On-disk inventory document.
///
/// `target` defaults to the file stem; `inventory` is handed to probes as is.
#[derive(Debug, Deserialize)]
struct InventoryDoc {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    inventory: serde_json::Value,
}

/// Discovery that reads the target's inventory from a file on every run.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    path: PathBuf,
}

impl FileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_target(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[async_trait]
impl Discovery for FileDiscovery {
    async fn discover(&self, run_id: &RunId) -> Result<ExecutionContext, DiscoveryError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DiscoveryError::Io {
                path: self.path.clone(),
                source,
            })?;
        let doc: InventoryDoc =
            serde_json::from_str(&text).map_err(|source| DiscoveryError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let target = doc.target.unwrap_or_else(|| self.default_target());
        info!(path = ?self.path, target = %target, labels = doc.labels.len(), "inventory loaded");

        let context = doc.labels.into_iter().fold(
            ExecutionContext::new(run_id.to_string(), target).with_inventory(doc.inventory),
            |ctx, (key, value)| ctx.with_label(key, value),
        );
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_inventory_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prod.json");
        std::fs::write(
            &path,
            r#"{"target": "prod-cluster", "labels": {"env": "prod"}, "inventory": {"nodes": 3}}"#,
        )
        .unwrap();

        let ctx = FileDiscovery::new(&path)
            .discover(&RunId::from("r1"))
            .await
            .unwrap();
        assert_eq!(ctx.run_id, "r1");
        assert_eq!(ctx.target, "prod-cluster");
        assert_eq!(ctx.labels["env"], "prod");
        assert_eq!(ctx.inventory["nodes"], 3);
    }

    #[tokio::test]
    async fn target_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging.json");
        std::fs::write(&path, "{}").unwrap();

        let ctx = FileDiscovery::new(&path)
            .discover(&RunId::from("r2"))
            .await
            .unwrap();
        assert_eq!(ctx.target, "staging");
        assert!(ctx.inventory.is_null());
    }

    #[tokio::test]
    async fn missing_and_malformed_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileDiscovery::new(dir.path().join("none.json"))
            .discover(&RunId::from("r"))
            .await;
        assert!(matches!(missing, Err(DiscoveryError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[not json").unwrap();
        let malformed = FileDiscovery::new(&bad).discover(&RunId::from("r")).await;
        assert!(matches!(malformed, Err(DiscoveryError::Parse { .. })));
    }
}
