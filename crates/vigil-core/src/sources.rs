//! Seams the orchestrator pulls its inputs through: discovery of the target
//! and the set of check definitions to run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{CategoryId, CheckDefinition, ExecutionContext, RunId};
use crate::error::{DefinitionError, DiscoveryError};
use crate::rules::ensure_unique;

/// Produces the execution context for a run.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self, run_id: &RunId) -> Result<ExecutionContext, DiscoveryError>;
}

/// Supplies the check definitions for a run.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn load(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<Arc<CheckDefinition>>, DefinitionError>;
}

/// Which definitions a run should execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionFilter {
    /// Empty admits every category.
    pub categories: Vec<CategoryId>,
    pub include_disabled: bool,
}

impl DefinitionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn categories(categories: Vec<CategoryId>) -> Self {
        Self {
            categories,
            include_disabled: false,
        }
    }

    pub fn admits(&self, def: &CheckDefinition) -> bool {
        if !def.enabled && !self.include_disabled {
            return false;
        }
        self.categories.is_empty() || self.categories.contains(&def.category)
    }

    /// Keep admitted definitions, preserving order.
    pub fn apply(&self, definitions: Vec<Arc<CheckDefinition>>) -> Vec<Arc<CheckDefinition>> {
        definitions.into_iter().filter(|d| self.admits(d)).collect()
    }
}

/// Discovery that hands out a fixed context, stamped with the run id.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    context: ExecutionContext,
}

impl StaticDiscovery {
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    pub fn target(target: impl Into<String>) -> Self {
        Self::new(ExecutionContext::new("", target))
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover(&self, run_id: &RunId) -> Result<ExecutionContext, DiscoveryError> {
        let mut context = self.context.clone();
        context.run_id = run_id.to_string();
        Ok(context)
    }
}

/// Definitions held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticDefinitionSource {
    definitions: Vec<Arc<CheckDefinition>>,
}

impl StaticDefinitionSource {
    pub fn new(definitions: Vec<CheckDefinition>) -> Self {
        Self {
            definitions: definitions.into_iter().map(Arc::new).collect(),
        }
    }
}

#[async_trait]
impl DefinitionSource for StaticDefinitionSource {
    async fn load(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<Arc<CheckDefinition>>, DefinitionError> {
        ensure_unique(&self.definitions)?;
        Ok(filter.apply(self.definitions.clone()))
    }
}
