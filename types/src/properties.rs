//! Typed property values for graph nodes and edges.
//!
//! Properties round-trip through SQL as JSON text; keeping them as a typed
//! sum (rather than a raw `serde_json::Value`) lets callers pattern-match on
//! shape without re-parsing, while `Display`/`serde` still give a direct JSON
//! encoding for storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::TypeError;

/// A JSON-shaped property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<PropertyValue>),
    Object(Properties),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// A node or edge's `properties` map. `BTreeMap` keeps serialized JSON
/// deterministic, which matters for export round-trips (S7).
pub type Properties = BTreeMap<String, PropertyValue>;

/// Serializes a properties map to the JSON text stored in the `properties`
/// column.
pub fn encode_properties(props: &Properties) -> Result<String, TypeError> {
    serde_json::to_string(props).map_err(|e| TypeError::MalformedMetadata {
        reason: e.to_string(),
    })
}

/// Parses a properties JSON text column back into a typed map. An empty or
/// absent column decodes to an empty map rather than an error.
pub fn decode_properties(s: &str) -> Result<Properties, TypeError> {
    if s.trim().is_empty() {
        return Ok(Properties::new());
    }
    serde_json::from_str(s).map_err(|e| TypeError::MalformedMetadata {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_nested_properties() {
        let mut props = Properties::new();
        props.insert("user_id".into(), "u1".into());
        props.insert("score".into(), 0.5.into());
        props.insert(
            "tags".into(),
            PropertyValue::Array(vec!["a".into(), "b".into()]),
        );

        let encoded = encode_properties(&props).unwrap();
        let decoded = decode_properties(&encoded).unwrap();
        assert_eq!(decoded, props);
    }

    #[test]
    fn empty_column_decodes_to_empty_map() {
        assert_eq!(decode_properties("").unwrap(), Properties::new());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(decode_properties("{not json").is_err());
    }
}
