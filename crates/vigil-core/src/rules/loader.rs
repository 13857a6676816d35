//! Loading check definitions from their JSON form.
//!
//! A document holds one definition object or an array of them. Loading
//! compiles every rule set and rejects duplicate check ids, so a successful
//! load never yields a definition the evaluator cannot run.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{CategoryId, CheckDefinition, CheckId, FieldSchema, PluginRef, Severity};

use super::error::RuleLoadError;
use super::rule::{RuleSet, RuleSpec};

fn default_enabled() -> bool {
    true
}

/// One check definition as written on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionDoc {
    pub check_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub category: String,
    pub severity: Severity,
    pub plugin: PluginRef,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub fields: FieldSchema,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl DefinitionDoc {
    /// Validate and compile into a [`CheckDefinition`].
    pub fn compile(self) -> Result<CheckDefinition, RuleLoadError> {
        let check_id = self.check_id.trim().to_string();
        if check_id.is_empty() {
            return Err(RuleLoadError::EmptyCheckId);
        }
        if let Some(field) = self.fields.keys().find(|f| f.starts_with('_')) {
            return Err(RuleLoadError::ReservedFieldDeclared {
                check_id,
                field: field.clone(),
            });
        }

        let rules = RuleSet::compile(&check_id, &self.rules, &self.fields, self.severity)?;

        Ok(CheckDefinition {
            name: self.name.unwrap_or_else(|| check_id.clone()),
            id: CheckId(check_id),
            category: CategoryId(self.category),
            severity: self.severity,
            plugin: self.plugin,
            enabled: self.enabled,
            description: self.description,
            params: self.params,
            fields: self.fields,
            rules,
        })
    }
}

/// Parse a JSON document holding one definition or an array of them.
pub fn parse_definitions(
    source_name: &str,
    text: &str,
) -> Result<Vec<DefinitionDoc>, RuleLoadError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| RuleLoadError::Parse {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })?;

    let docs = match value {
        serde_json::Value::Array(_) => serde_json::from_value::<Vec<DefinitionDoc>>(value),
        other => serde_json::from_value::<DefinitionDoc>(other).map(|d| vec![d]),
    };
    docs.map_err(|e| RuleLoadError::Parse {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    })
}

/// Compile documents, rejecting duplicate check ids.
pub fn compile_definitions(
    docs: Vec<DefinitionDoc>,
) -> Result<Vec<Arc<CheckDefinition>>, RuleLoadError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let def = doc.compile()?;
        if !seen.insert(def.id.clone()) {
            return Err(RuleLoadError::DuplicateCheckId {
                check_id: def.id.0,
            });
        }
        out.push(Arc::new(def));
    }
    Ok(out)
}

/// Parse and compile in one step.
pub fn load_definitions(
    source_name: &str,
    text: &str,
) -> Result<Vec<Arc<CheckDefinition>>, RuleLoadError> {
    compile_definitions(parse_definitions(source_name, text)?)
}

/// Reject duplicate ids across already compiled definitions.
pub fn ensure_unique(definitions: &[Arc<CheckDefinition>]) -> Result<(), RuleLoadError> {
    let mut seen = HashSet::new();
    for def in definitions {
        if !seen.insert(&def.id) {
            return Err(RuleLoadError::DuplicateCheckId {
                check_id: def.id.0.clone(),
            });
        }
    }
    Ok(())
}

/// SHA-256 over the sorted check ids, hex encoded.
pub fn definitions_digest(definitions: &[Arc<CheckDefinition>]) -> String {
    let mut ids: Vec<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
