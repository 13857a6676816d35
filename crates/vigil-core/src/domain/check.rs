//! Check definitions: what to run, against which plugin, and how to judge it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::result::FieldValue;
use crate::rules::RuleSet;

/// Stable identifier of a check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(pub String);

impl CheckId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckId {
    fn from(s: &str) -> Self {
        CheckId(s.to_string())
    }
}

/// Category a check contributes its score to (e.g. "security", "backup").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(s: &str) -> Self {
        CategoryId(s.to_string())
    }
}

/// Issue severity. Ordered so that `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    fn rank(self) -> u8 {
        match self {
            Severity::Critical => 3,
            Severity::High => 2,
            Severity::Medium => 1,
            Severity::Low => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a check's probe is located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginRef {
    /// A plugin registered in-process under this name.
    Named(String),
    /// An external executable: `command[0]` with `command[1..]` as arguments.
    Command { command: Vec<String> },
}

impl fmt::Display for PluginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginRef::Named(name) => f.write_str(name),
            PluginRef::Command { command } => write!(f, "command:{}", command.join(" ")),
        }
    }
}

/// Declared type of a probe output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Text,
    List,
    Map,
    /// No static type; checked only at evaluation time.
    Any,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float | FieldType::Any)
    }

    /// Whether a literal in a rule can be compared against a field of this type.
    pub fn admits(self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldType::Any, _) | (_, FieldValue::Null) => true,
            (FieldType::Bool, FieldValue::Bool(_)) => true,
            (FieldType::Int | FieldType::Float, FieldValue::Int(_) | FieldValue::Float(_)) => true,
            (FieldType::Text, FieldValue::Text(_)) => true,
            (FieldType::List, FieldValue::List(_)) => true,
            (FieldType::Map, FieldValue::Map(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::List => "list",
            FieldType::Map => "map",
            FieldType::Any => "any",
        };
        f.write_str(s)
    }
}

/// Declared output fields of a check, by name.
pub type FieldSchema = BTreeMap<String, FieldType>;

/// A loaded, validated check. Immutable; shared as `Arc<CheckDefinition>`.
#[derive(Debug, Clone)]
pub struct CheckDefinition {
    pub id: CheckId,
    pub name: String,
    pub category: CategoryId,
    /// Default severity for issues whose template does not set one.
    pub severity: Severity,
    pub plugin: PluginRef,
    pub enabled: bool,
    pub description: Option<String>,
    /// Opaque parameters handed to the plugin.
    pub params: serde_json::Value,
    pub fields: FieldSchema,
    pub rules: RuleSet,
}

impl CheckDefinition {
    /// A definition with no declared fields and no rules.
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        plugin: PluginRef,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: CheckId(id),
            category: CategoryId(category.into()),
            severity,
            plugin,
            enabled: true,
            description: None,
            params: serde_json::Value::Null,
            fields: FieldSchema::new(),
            rules: RuleSet::empty(),
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
    }

    #[test]
    fn unknown_severity_rejected_by_serde() {
        let err = serde_json::from_str::<Severity>("\"urgent\"");
        assert!(err.is_err());
        let ok: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(ok, Severity::Medium);
    }

    #[test]
    fn plugin_ref_accepts_name_or_command() {
        let named: PluginRef = serde_json::from_str("\"disk_usage\"").unwrap();
        assert_eq!(named, PluginRef::Named("disk_usage".into()));

        let cmd: PluginRef =
            serde_json::from_str(r#"{"command": ["./probe.sh", "--fast"]}"#).unwrap();
        assert_eq!(cmd.to_string(), "command:./probe.sh --fast");
    }

    #[test]
    fn field_type_admits_numeric_literals_for_int_and_float() {
        assert!(FieldType::Int.admits(&FieldValue::Float(1.5)));
        assert!(FieldType::Float.admits(&FieldValue::Int(3)));
        assert!(!FieldType::Text.admits(&FieldValue::Int(3)));
        assert!(FieldType::Text.admits(&FieldValue::Null));
    }
}
