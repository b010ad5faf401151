//! Signal Bag
//!
//! Sparse, unordered output of the raw-signal collectors.

use std::collections::HashMap;

use serde::Deserialize;

/// A single collected signal value
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    /// Collector reported the signal as unavailable
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Ordered list; only primitives are valid elements
    List(Vec<SignalValue>),
    /// Nested record; key order is not significant
    Record(Vec<(String, SignalValue)>),
}

impl SignalValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SignalValue::Null)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            SignalValue::Null | SignalValue::Text(_) | SignalValue::Number(_) | SignalValue::Bool(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SignalValue::Null => "null",
            SignalValue::Text(_) => "string",
            SignalValue::Number(_) => "number",
            SignalValue::Bool(_) => "boolean",
            SignalValue::List(_) => "list",
            SignalValue::Record(_) => "record",
        }
    }
}

impl From<serde_json::Value> for SignalValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => SignalValue::Null,
            Value::Bool(b) => SignalValue::Bool(b),
            // Numbers outside f64 range cannot occur in serde_json without arbitrary_precision
            Value::Number(n) => n.as_f64().map(SignalValue::Number).unwrap_or(SignalValue::Null),
            Value::String(s) => SignalValue::Text(s),
            Value::Array(items) => SignalValue::List(items.into_iter().map(SignalValue::from).collect()),
            Value::Object(map) => SignalValue::Record(
                map.into_iter().map(|(k, v)| (k, SignalValue::from(v))).collect(),
            ),
        }
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        SignalValue::Text(value)
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Number(value)
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        SignalValue::Number(value as f64)
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        SignalValue::Bool(value)
    }
}

/// Sparse mapping signal key → value
///
/// A key that is absent and a key that maps to `SignalValue::Null` both
/// canonicalize to the null marker; an empty string or empty list does not.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "serde_json::Map<String, serde_json::Value>")]
pub struct SignalBag {
    values: HashMap<String, SignalValue>,
}

impl SignalBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; anything else yields an empty bag
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self::from(map),
            other => {
                log::warn!("Signal bag must be a JSON object, got {}", json_type(&other));
                Self::default()
            }
        }
    }

    /// Insert or replace a signal
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SignalValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SignalValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Mark a signal as explicitly unavailable
    pub fn insert_null(&mut self, key: impl Into<String>) {
        self.values.insert(key.into(), SignalValue::Null);
    }

    /// Insert only if the collector did not already provide the key
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<SignalValue>) {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&SignalValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<SignalValue> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for SignalBag {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            values: map
                .into_iter()
                .map(|(key, value)| (key, SignalValue::from(value)))
                .collect(),
        }
    }
}

impl FromIterator<(String, SignalValue)> for SignalBag {
    fn from_iter<I: IntoIterator<Item = (String, SignalValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
