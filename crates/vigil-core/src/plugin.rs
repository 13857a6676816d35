//! The plugin contract every check satisfies, and the registry that resolves
//! a definition's [`PluginRef`] to something invocable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{CheckDefinition, ExecutionContext, FieldMap, FieldValue, PluginRef};

/// Everything a plugin receives for one invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub definition: Arc<CheckDefinition>,
    pub context: Arc<ExecutionContext>,
    /// Point in time after which the result is discarded.
    pub deadline: Instant,
    /// Fired on timeout or batch cancellation. Cooperative plugins should stop.
    pub cancel: CancellationToken,
}

impl Invocation {
    pub fn params(&self) -> &serde_json::Value {
        &self.definition.params
    }

    /// Time left before the deadline (zero once passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// What a plugin reports on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginOutput {
    pub fields: FieldMap,
    /// One entry per affected object for fan-out probes. `Some(vec![])`
    /// reports a fan-out probe that found nothing.
    pub findings: Option<Vec<FieldMap>>,
}

impl PluginOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_finding(mut self, finding: FieldMap) -> Self {
        self.findings.get_or_insert_with(Vec::new).push(finding);
        self
    }

    /// Interpret a probe's JSON document.
    ///
    /// An object becomes the field map; a `findings` array inside it becomes
    /// the findings. A top-level array is a list of findings.
    pub fn from_json(value: serde_json::Value) -> Result<Self, PluginError> {
        match value {
            serde_json::Value::Object(mut obj) => {
                let findings = match obj.remove("findings") {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::Array(items)) => Some(findings_from(items)?),
                    Some(other) => {
                        return Err(PluginError::InvalidOutput(format!(
                            "`findings` must be an array, got {}",
                            json_kind(&other)
                        )))
                    }
                };
                let fields = obj.into_iter().map(|(k, v)| (k, v.into())).collect();
                Ok(Self { fields, findings })
            }
            serde_json::Value::Array(items) => Ok(Self {
                fields: FieldMap::new(),
                findings: Some(findings_from(items)?),
            }),
            other => Err(PluginError::InvalidOutput(format!(
                "expected a JSON object or array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn findings_from(items: Vec<serde_json::Value>) -> Result<Vec<FieldMap>, PluginError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let kind = json_kind(&item);
            FieldValue::map_from_json(item).ok_or_else(|| {
                PluginError::InvalidOutput(format!("finding {i} must be an object, got {kind}"))
            })
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Errors a plugin may return. The scheduler turns all of them into an
/// `Error` raw result.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("probe failed: {0}")]
    Failed(String),

    #[error("invalid probe output: {0}")]
    InvalidOutput(String),

    #[error("probe cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A diagnostic probe.
#[async_trait]
pub trait CheckPlugin: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Run the probe once. Must not mutate the context.
    ///
    /// The deadline is enforced by a timer on the same runtime, so `invoke`
    /// must not block its worker thread. Blocking work (synchronous I/O,
    /// `std::thread::sleep`, CPU-heavy parsing) belongs in
    /// `tokio::task::spawn_blocking`; the timeout then fires on time and the
    /// blocking thread is left to finish on its own.
    async fn invoke(&self, invocation: &Invocation) -> Result<PluginOutput, PluginError>;
}

/// Runs external-command probes (`PluginRef::Command`).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &[String],
        invocation: &Invocation,
    ) -> Result<PluginOutput, PluginError>;
}

/// Adapts a command runner + argv to the plugin contract.
struct CommandPlugin {
    runner: Arc<dyn CommandRunner>,
    command: Vec<String>,
}

#[async_trait]
impl CheckPlugin for CommandPlugin {
    fn name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("command")
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<PluginOutput, PluginError> {
        self.runner.run(&self.command, invocation).await
    }
}

/// Named plugins plus an optional command runner. Read-only once built.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn CheckPlugin>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.plugins.keys().collect();
        names.sort();
        f.debug_struct("PluginRegistry")
            .field("plugins", &names)
            .field("command_runner", &self.command_runner.is_some())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own name, replacing any previous one.
    pub fn register(&mut self, plugin: Arc<dyn CheckPlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn CheckPlugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(runner);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Resolve a reference. `None` means the plugin is not available.
    pub fn resolve(&self, plugin: &PluginRef) -> Option<Arc<dyn CheckPlugin>> {
        match plugin {
            PluginRef::Named(name) => self.plugins.get(name).cloned(),
            PluginRef::Command { command } if command.is_empty() => None,
            PluginRef::Command { command } => {
                let runner = self.command_runner.clone()?;
                Some(Arc::new(CommandPlugin {
                    runner,
                    command: command.clone(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl CheckPlugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, inv: &Invocation) -> Result<PluginOutput, PluginError> {
            Ok(PluginOutput::new().with_field("check", inv.definition.id.as_str()))
        }
    }

    struct Runner;

    #[async_trait]
    impl CommandRunner for Runner {
        async fn run(
            &self,
            command: &[String],
            _inv: &Invocation,
        ) -> Result<PluginOutput, PluginError> {
            Ok(PluginOutput::new().with_field("argv0", command[0].as_str()))
        }
    }

    #[test]
    fn from_json_object_splits_findings() {
        let out = PluginOutput::from_json(json!({
            "host": "db01",
            "findings": [{"table": "users"}, {"table": "orders"}]
        }))
        .unwrap();
        assert_eq!(out.fields["host"], FieldValue::from("db01"));
        assert!(!out.fields.contains_key("findings"));
        assert_eq!(out.findings.map(|f| f.len()), Some(2));
    }

    #[test]
    fn from_json_keeps_empty_findings_distinct_from_none() {
        let empty = PluginOutput::from_json(json!({"domain": "corp", "findings": []})).unwrap();
        assert_eq!(empty.findings, Some(vec![]));

        let top_level = PluginOutput::from_json(json!([])).unwrap();
        assert_eq!(top_level.findings, Some(vec![]));

        let plain = PluginOutput::from_json(json!({"domain": "corp"})).unwrap();
        assert_eq!(plain.findings, None);
    }

    #[test]
    fn from_json_array_is_findings_only() {
        let out = PluginOutput::from_json(json!([{"a": 1}])).unwrap();
        assert!(out.fields.is_empty());
        assert_eq!(out.findings.unwrap()[0]["a"], FieldValue::Int(1));
    }

    #[test]
    fn from_json_rejects_scalars_and_bad_findings() {
        assert!(matches!(
            PluginOutput::from_json(json!(3)),
            Err(PluginError::InvalidOutput(_))
        ));
        assert!(matches!(
            PluginOutput::from_json(json!({"findings": [1]})),
            Err(PluginError::InvalidOutput(_))
        ));
        assert!(matches!(
            PluginOutput::from_json(json!({"findings": "x"})),
            Err(PluginError::InvalidOutput(_))
        ));
    }

    #[test]
    fn registry_resolves_named_and_command() {
        let registry = PluginRegistry::new()
            .with_plugin(Arc::new(Echo))
            .with_command_runner(Arc::new(Runner));

        assert!(registry.contains("echo"));
        assert!(registry.resolve(&PluginRef::Named("echo".into())).is_some());
        assert!(registry.resolve(&PluginRef::Named("other".into())).is_none());
        assert!(registry
            .resolve(&PluginRef::Command {
                command: vec!["./probe".into()]
            })
            .is_some());
        assert!(registry
            .resolve(&PluginRef::Command { command: vec![] })
            .is_none());
    }

    #[test]
    fn command_refs_unresolved_without_runner() {
        let registry = PluginRegistry::new();
        assert!(registry
            .resolve(&PluginRef::Command {
                command: vec!["./probe".into()]
            })
            .is_none());
    }
}
