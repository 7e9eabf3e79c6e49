//! Identifier sanitization and column-type inference.

use std::collections::BTreeMap;

use crate::types::{ColumnType, Field, Record, Schema, Value};

/// Maximum identifier length in bytes (PostgreSQL's `NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Number of leading records sampled for type inference.
pub const SAMPLE_SIZE: usize = 100;

/// Which kind of identifier is being sanitized; decides the prefix for names that would
/// otherwise start with a digit or underscore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierRole {
    Table,
    Column,
}

impl IdentifierRole {
    fn prefix(self) -> &'static str {
        match self {
            Self::Table => "t_",
            Self::Column => "c_",
        }
    }
}

/// Sanitize a table name. See [`sanitize_identifier`].
pub fn sanitize_table_name(name: &str) -> String {
    sanitize_identifier(name, IdentifierRole::Table)
}

/// Sanitize a column name. See [`sanitize_identifier`].
pub fn sanitize_column_name(name: &str) -> String {
    sanitize_identifier(name, IdentifierRole::Column)
}

/// Turn arbitrary text into a warehouse identifier matching `^[a-z_][a-z0-9_]{0,62}$`.
///
/// Lower-cases, replaces every character outside `[a-z0-9_]` with `_`, prefixes names starting
/// with a digit or underscore with the role marker, and truncates to 63 bytes. Applying it to
/// its own output returns the same string. The empty string becomes the bare role marker.
///
/// ```
/// use warehouse_etl::schema::sanitize_column_name;
///
/// assert_eq!(sanitize_column_name("Order Date"), "order_date");
/// assert_eq!(sanitize_column_name("2024 total"), "c_2024_total");
/// ```
pub fn sanitize_identifier(name: &str, role: IdentifierRole) -> String {
    let mut out: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect();

    // Prefixed output starts with a letter, so a second pass leaves it alone.
    match out.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '_' => out.insert_str(0, role.prefix()),
        None => out.push_str(role.prefix()),
        _ => {}
    }

    out.truncate(MAX_IDENTIFIER_LEN);
    out
}

/// Runtime kind of a sampled value, as seen by inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Integer,
    Float,
    DateLike,
    Text,
}

fn classify_value(v: &Value) -> Option<ValueKind> {
    match v {
        Value::Null => None,
        Value::Int64(_) => Some(ValueKind::Integer),
        Value::Float64(_) => Some(ValueKind::Float),
        Value::Bool(_) => Some(ValueKind::Text),
        Value::Text(s) => Some(classify_text(s)),
    }
}

fn classify_text(s: &str) -> ValueKind {
    let t = s.trim();
    if t.parse::<i64>().is_ok() {
        ValueKind::Integer
    } else if t.parse::<f64>().is_ok_and(f64::is_finite) {
        ValueKind::Float
    } else if looks_like_date(s) {
        ValueKind::DateLike
    } else {
        ValueKind::Text
    }
}

/// Date heuristic: contains "20" and is at least 8 bytes long. Not calendar-aware.
pub fn looks_like_date(s: &str) -> bool {
    s.contains("20") && s.len() >= 8
}

/// Resolve a column type from sampled values.
///
/// Priority: any float ⇒ NUMERIC; integers with no float/text ⇒ INTEGER; date-likes with no
/// text ⇒ DATE; anything else (including all-null) ⇒ TEXT.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let (mut has_int, mut has_float, mut has_date, mut has_text) = (false, false, false, false);
    for kind in values.into_iter().filter_map(classify_value) {
        match kind {
            ValueKind::Integer => has_int = true,
            ValueKind::Float => has_float = true,
            ValueKind::DateLike => has_date = true,
            ValueKind::Text => has_text = true,
        }
    }

    if has_float {
        ColumnType::Numeric
    } else if has_int && !has_text {
        ColumnType::Integer
    } else if has_date && !has_text {
        ColumnType::Date
    } else {
        ColumnType::Text
    }
}

/// Infer a schema from the first [`SAMPLE_SIZE`] records.
///
/// The column set is the union of keys across the sample, sanitized and ordered by name. When
/// two source keys sanitize to the same name their samples are merged.
pub fn infer_schema(records: &[Record]) -> Schema {
    let mut samples: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for record in records.iter().take(SAMPLE_SIZE) {
        for (key, value) in record {
            samples
                .entry(sanitize_column_name(key))
                .or_default()
                .push(value);
        }
    }

    Schema::new(
        samples
            .into_iter()
            .map(|(name, values)| Field::new(name, infer_column_type(values)))
            .collect(),
    )
}
