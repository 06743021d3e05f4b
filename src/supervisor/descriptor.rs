//! Outbound descriptor handed to the core verbatim

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// How the core reaches the upstream server.
///
/// Opaque JSON object; only non-emptiness is checked here so new upstream
/// protocols need no change in this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundDescriptor(Map<String, Value>);

impl OutboundDescriptor {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) if !map.is_empty() => Ok(Self(map)),
            Value::Object(_) => Err(Error::Config("outbound descriptor is empty".into())),
            other => Err(Error::Config(format!(
                "outbound descriptor must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse outbound descriptor: {}", e)))?;
        Self::from_value(value)
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read outbound file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// The descriptor's `protocol` field, if any
    pub fn protocol(&self) -> Option<&str> {
        self.0.get("protocol").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
