//! JSON extraction.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single JSON object, treated as a one-record batch: `{"a":1}`
//!
//! Nested objects and arrays are kept as their JSON text.

use std::fs;
use std::path::Path;

use crate::error::{ExtractError, ExtractResult};
use crate::types::{Record, Value};

/// Extract records from a JSON file.
pub fn extract_json_from_path(path: impl AsRef<Path>) -> ExtractResult<Vec<Record>> {
    let text = fs::read_to_string(path)?;
    extract_json_from_str(&text)
}

/// Extract records from an in-memory JSON string.
pub fn extract_json_from_str(input: &str) -> ExtractResult<Vec<Record>> {
    let doc: serde_json::Value = serde_json::from_str(input)?;
    match doc {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx0, item)| match item {
                serde_json::Value::Object(obj) => Ok(record_from_json_object(obj)),
                other => Err(ExtractError::Malformed {
                    message: format!(
                        "element {} is not a json object (got {})",
                        idx0 + 1,
                        json_kind(&other)
                    ),
                }),
            })
            .collect(),
        serde_json::Value::Object(obj) => Ok(vec![record_from_json_object(obj)]),
        other => Err(ExtractError::Malformed {
            message: format!(
                "json must be an object or an array of objects (got {})",
                json_kind(&other)
            ),
        }),
    }
}

/// Convert one JSON object into a [`Record`].
pub fn record_from_json_object(obj: serde_json::Map<String, serde_json::Value>) -> Record {
    obj.into_iter()
        .map(|(k, v)| (k, value_from_json(v)))
        .collect()
}

/// Map a JSON value onto the pipeline's scalar model.
pub fn value_from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::Text(s),
        nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
            Value::Text(nested.to_string())
        }
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
