//! Value normalization applied between extraction and loading.

use crate::types::{Record, Value};

/// Normalize every value of every record.
///
/// Text is trimmed; text that is empty after trimming becomes [`Value::Null`]. Key sets and
/// record count are unchanged.
pub fn transform(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|(k, v)| (k, normalize_value(v)))
                .collect()
        })
        .collect()
}

/// Canonical form of a single value.
pub fn normalize_value(v: Value) -> Value {
    match v {
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else if trimmed.len() == s.len() {
                Value::Text(s)
            } else {
                Value::Text(trimmed.to_owned())
            }
        }
        Value::Float64(f) if f.is_nan() => Value::Null,
        other => other,
    }
}
