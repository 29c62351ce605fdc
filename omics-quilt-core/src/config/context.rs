use crate::{QuiltError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Built-in values used when neither the caller nor the environment sets a key.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("APP_NAME", "omics-quilt"),
    ("CDK_DEFAULT_EMAIL", "test@example.com"),
    ("CDK_DEFAULT_REGION", "us-east-1"),
    ("READY2RUN_WORKFLOW_ID", "9500764"),
    ("TIMESTAMP_FILE", "quilt_timestamp.json"),
    ("SOURCE_APP", "omics-quilt"),
    ("QUILT_METADATA", "quilt_metadata.json"),
    ("INPUT_METADATA", "input_metadata.json"),
    ("QUILT_SUMMARIZE", "quilt_summarize.json"),
    ("LOG_LEVEL", "ALL"),
    ("TIMEOUT", "900"),
];

pub fn default_values() -> impl Iterator<Item = (String, Value)> {
    DEFAULTS
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
}

/// Per-invocation key/value context.
///
/// Construction precedence is caller overrides, then process environment,
/// then [`DEFAULTS`]. A key set by a higher source is never replaced by a
/// lower one; only [`ConfigContext::put`] overwrites.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigContext {
    values: BTreeMap<String, Value>,
}

impl ConfigContext {
    pub fn new(overrides: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::from_sources(
            overrides,
            std::env::vars().map(|(key, value)| (key, Value::String(value))),
            default_values(),
        )
    }

    pub fn from_sources(
        overrides: impl IntoIterator<Item = (String, Value)>,
        environment: impl IntoIterator<Item = (String, Value)>,
        defaults: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let mut context = Self::default();
        context.merge_if_absent(overrides);
        context.merge_if_absent(environment);
        context.merge_if_absent(defaults);
        context
    }

    pub fn from_map(overrides: Map<String, Value>) -> Self {
        Self::new(overrides)
    }

    /// Inserts each item whose key is not yet set to a non-null value.
    pub fn merge_if_absent(&mut self, items: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in items {
            let absent = self.values.get(&key).is_none_or(Value::is_null);
            if absent {
                self.values.insert(key, value);
            }
        }
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Value of `key` rendered as text; strings are returned verbatim.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Like [`ConfigContext::get_string`] but treats the empty string as unset.
    pub fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get_string(key).filter(|value| !value.trim().is_empty())
    }

    /// Reads `key`, falling back to `fallback` when `key` is unset or falsy.
    pub fn get_or(&self, key: &str, fallback: &str) -> Option<String> {
        match self.get(key) {
            Some(value) if is_truthy_value(value) => self.get_string(key),
            _ => self.get_string(fallback),
        }
    }

    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy_value)
    }

    pub fn timeout(&self) -> Result<u64> {
        let raw = self
            .get_non_empty("TIMEOUT")
            .ok_or_else(|| QuiltError::Config("TIMEOUT is not set".to_string()))?;
        raw.trim()
            .parse::<u64>()
            .map_err(|error| QuiltError::Config(format!("TIMEOUT '{}' is not an integer: {}", raw, error)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

fn is_truthy_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
