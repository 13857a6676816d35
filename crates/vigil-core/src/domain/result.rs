//! Raw probe output: a fixed envelope plus an open, typed field map.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::check::CheckId;

/// Reserved pseudo-field names resolved from the envelope.
pub const FIELD_CHECK_ID: &str = "_check_id";
pub const FIELD_STATUS: &str = "_status";
pub const FIELD_ERROR: &str = "_error";
pub const FIELD_DURATION_MS: &str = "_duration_ms";

pub const RESERVED_FIELDS: [&str; 4] = [FIELD_CHECK_ID, FIELD_STATUS, FIELD_ERROR, FIELD_DURATION_MS];

/// A dynamically typed value reported by a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

/// Probe output fields by name.
pub type FieldMap = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::List(_) => "list",
            FieldValue::Map(_) => "map",
        }
    }

    /// Numeric view of `Int` and `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Typed equality. `Int` and `Float` compare numerically; `Null` equals
    /// only `Null`. Returns `None` when the two values are of incomparable
    /// kinds (e.g. text against a number).
    pub fn typed_eq(&self, other: &FieldValue) -> Option<bool> {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Some(true),
            (FieldValue::Null, _) | (_, FieldValue::Null) => Some(false),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a == b),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a == b),
            (FieldValue::List(a), FieldValue::List(b)) => Some(a == b),
            (FieldValue::Map(a), FieldValue::Map(b)) => Some(a == b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(x == y),
                _ => None,
            },
        }
    }

    /// Build a map from a JSON object; any other JSON value yields `None`.
    pub fn map_from_json(value: serde_json::Value) -> Option<FieldMap> {
        match FieldValue::from(value) {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(obj) => {
                FieldValue::Map(obj.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// Rendering used for issue text. Text is unquoted, `Null` is empty, and
/// lists and maps render as JSON.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => f.write_str(s),
            other => {
                let json = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// Outcome of a single plugin invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawStatus {
    Completed,
    Error,
    TimedOut,
}

impl RawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawStatus::Completed => "completed",
            RawStatus::Error => "error",
            RawStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit the scheduler emits for every submitted check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub check_id: CheckId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: RawStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub fields: FieldMap,
    /// Per-object findings of a fan-out probe. Expanded before evaluation.
    ///
    /// `None` means the probe did not fan out; `Some(vec![])` means it did
    /// and found no affected objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<FieldMap>>,
}

impl RawResult {
    pub fn completed(
        check_id: CheckId,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        fields: FieldMap,
        findings: Option<Vec<FieldMap>>,
    ) -> Self {
        Self {
            check_id,
            started_at,
            ended_at,
            status: RawStatus::Completed,
            error_message: None,
            fields,
            findings,
        }
    }

    pub fn error(
        check_id: CheckId,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self::failed(check_id, started_at, ended_at, RawStatus::Error, message.into())
    }

    pub fn timed_out(
        check_id: CheckId,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self::failed(check_id, started_at, ended_at, RawStatus::TimedOut, message.into())
    }

    fn failed(
        check_id: CheckId,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        status: RawStatus,
        message: String,
    ) -> Self {
        Self {
            check_id,
            started_at,
            ended_at,
            status,
            error_message: Some(message),
            fields: FieldMap::new(),
            findings: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RawStatus::Completed
    }

    /// A completed fan-out probe that reported no affected objects.
    pub fn is_empty_fan_out(&self) -> bool {
        self.is_completed() && self.findings.as_ref().is_some_and(Vec::is_empty)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.ended_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Resolve a field by name, including the reserved envelope fields.
    pub fn lookup(&self, name: &str) -> Option<Cow<'_, FieldValue>> {
        match name {
            FIELD_CHECK_ID => Some(Cow::Owned(FieldValue::Text(self.check_id.0.clone()))),
            FIELD_STATUS => Some(Cow::Owned(FieldValue::Text(self.status.as_str().into()))),
            FIELD_ERROR => Some(Cow::Owned(
                self.error_message
                    .clone()
                    .map(FieldValue::Text)
                    .unwrap_or(FieldValue::Null),
            )),
            FIELD_DURATION_MS => Some(Cow::Owned(FieldValue::Int(
                i64::try_from(self.duration_ms()).unwrap_or(i64::MAX),
            ))),
            _ => self.fields.get(name).map(Cow::Borrowed),
        }
    }

    /// Fan a completed result with findings out into one result per finding.
    ///
    /// Each expanded result keeps the envelope and base fields; the finding's
    /// fields override base fields of the same name. A result that did not
    /// fan out, or fanned out to nothing, is returned unchanged.
    pub fn expand(self) -> Vec<RawResult> {
        let fanned_out = self.findings.as_ref().is_some_and(|f| !f.is_empty());
        if !fanned_out || !self.is_completed() {
            return vec![self];
        }

        let RawResult {
            check_id,
            started_at,
            ended_at,
            status,
            error_message,
            fields,
            findings,
        } = self;

        findings
            .unwrap_or_default()
            .into_iter()
            .map(|finding| {
                let mut merged = fields.clone();
                merged.extend(finding);
                RawResult {
                    check_id: check_id.clone(),
                    started_at,
                    ended_at,
                    status,
                    error_message: error_message.clone(),
                    fields: merged,
                    findings: None,
                }
            })
            .collect()
    }
}
