//! Result payload returned by a stage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which a stage lists its recoverable per-item errors.
pub const ERRORS_KEY: &str = "errors";

/// Structured result of a successful stage.
///
/// The payload is stage-defined. The orchestrator only inspects the
/// [`ERRORS_KEY`] field: a non-empty array there downgrades the run to
/// `completed_with_errors` without aborting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageResult {
    data: Map<String, Value>,
}

impl StageResult {
    /// Creates an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a result from an arbitrary JSON value.
    ///
    /// Objects are used as-is, anything else is stored under `"value"`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            Value::Null => Self::default(),
            other => {
                let mut data = Map::new();
                data.insert("value".to_string(), other);
                Self { data }
            }
        }
    }

    /// Sets a field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Appends one recoverable error to the `errors` list.
    #[must_use]
    pub fn with_recoverable_error(mut self, error: impl Into<Value>) -> Self {
        let entry = self
            .data
            .entry(ERRORS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(error.into()),
            other => *other = Value::Array(vec![error.into()]),
        }
        self
    }

    /// Gets a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Recoverable errors reported by the stage.
    #[must_use]
    pub fn recoverable_errors(&self) -> &[Value] {
        match self.data.get(ERRORS_KEY) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Returns true if the stage reported at least one recoverable error.
    #[must_use]
    pub fn has_recoverable_errors(&self) -> bool {
        !self.recoverable_errors().is_empty()
    }

    /// Borrows the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Consumes the result into its map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }

    /// Returns the payload as a JSON object value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

impl From<Map<String, Value>> for StageResult {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}
