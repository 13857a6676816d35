//! Check definitions loaded from a directory of JSON files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use vigil_core::rules::{compile_definitions, parse_definitions};
use vigil_core::{CheckDefinition, DefinitionError, DefinitionFilter, DefinitionSource};

/// Loads every `*.json` file in a directory, in path order.
///
/// Check ids must be unique across all files. The directory is re-read on
/// every load.
#[derive(Debug, Clone)]
pub struct DirectoryDefinitionSource {
    dir: PathBuf,
}

impl DirectoryDefinitionSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn definition_files(&self) -> Result<Vec<PathBuf>, DefinitionError> {
        let io_err = |source| DefinitionError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl DefinitionSource for DirectoryDefinitionSource {
    async fn load(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<Arc<CheckDefinition>>, DefinitionError> {
        let mut docs = Vec::new();
        for path in self.definition_files().await? {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| DefinitionError::Io {
                    path: path.clone(),
                    source,
                })?;
            let parsed = parse_definitions(&path.display().to_string(), &text)?;
            debug!(path = ?path, definitions = parsed.len(), "definition file parsed");
            docs.extend(parsed);
        }

        let definitions = filter.apply(compile_definitions(docs)?);
        info!(dir = ?self.dir, definitions = definitions.len(), "definitions loaded");
        Ok(definitions)
    }
}
