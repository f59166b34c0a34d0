//! Value codec: one closed value type with SQL-literal and CSV encodings.
//!
//! Every row that moves through export or import passes through [`Value`].
//! Encoding is total. Decoding never fails either: a cell that cannot be
//! parsed for its declared column type degrades to `Null` rather than
//! aborting a million-row import. The database remains the final validator.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{Row, ValueRef};
use std::str::FromStr;

use crate::schema::TypeCategory;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell value in transit between databases and artifacts.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Render a value as a MySQL literal, ready to splice into an INSERT.
///
/// Backslashes are escaped before quotes so the two passes cannot interfere.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
        Value::Json(j) => quote_sql_string(&j.to_string()),
        Value::Text(s) => quote_sql_string(s),
    }
}

fn quote_sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// Parse a SQL literal back into a value for the given column type.
///
/// Inverse of [`sql_literal`] for values produced by this crate. Anything
/// unparseable degrades to `Null`.
pub fn decode_sql_literal(literal: &str, category: TypeCategory) -> Value {
    let trimmed = literal.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") {
        return Value::Null;
    }

    let unquoted = if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        trimmed[1..trimmed.len() - 1]
            .replace("''", "'")
            .replace("\\\\", "\\")
    } else {
        trimmed.to_string()
    };

    coerce(&unquoted, category)
}

/// Render the unquoted CSV cell content for a value.
///
/// RFC 4180 quoting is the writer's job; see [`quote_csv_field`].
pub fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        Value::Json(j) => j.to_string(),
        Value::Text(s) => s.clone(),
    }
}

/// Apply RFC 4180 quoting to a cell: wrap in quotes iff the content contains
/// a comma, quote, CR, or LF, doubling any internal quotes.
///
/// The `csv` crate applies this rule itself when writing; this helper exists
/// so the rule is testable in isolation.
pub fn quote_csv_field(content: &str) -> String {
    if content.contains(',') || content.contains('"') || content.contains('\r') || content.contains('\n')
    {
        format!("\"{}\"", content.replace('"', "\"\""))
    } else {
        content.to_string()
    }
}

/// Parse one CSV cell for the given column type. Never errors.
///
/// Empty cells are NULL. Cells opening with `[` or `{` are tried as JSON
/// first regardless of the declared type, keeping serialized arrays intact
/// when a column was widened to JSON after the export was taken.
pub fn decode_csv_field(raw: &str, category: TypeCategory) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return Value::Json(parsed);
        }
        return Value::Text(trimmed.to_string());
    }

    coerce(trimmed, category)
}

/// Type-directed string coercion shared by both decoders.
fn coerce(s: &str, category: TypeCategory) -> Value {
    match category {
        TypeCategory::Integer => match s.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Null,
        },
        TypeCategory::Decimal => match Decimal::from_str(s) {
            Ok(d) => Value::Decimal(d),
            Err(_) => Value::Null,
        },
        TypeCategory::Boolean => match s {
            "1" | "true" | "TRUE" => Value::Bool(true),
            "0" | "false" | "FALSE" => Value::Bool(false),
            _ => Value::Null,
        },
        TypeCategory::DateTime => {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
                Value::DateTime(dt)
            } else if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Value::DateTime(d.and_time(chrono::NaiveTime::MIN))
            } else {
                Value::Null
            }
        }
        TypeCategory::Json => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(parsed) => Value::Json(parsed),
            Err(_) => Value::Text(s.to_string()),
        },
        TypeCategory::Text => Value::Text(s.to_string()),
    }
}

/// Extract one column from a fetched row as a [`Value`].
///
/// NULL is detected through the raw value first; the typed `try_get` calls
/// then fall back through wider representations before giving up with Null,
/// so an unexpected column type never aborts an export.
pub fn row_value(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
    let is_null = row
        .try_get_raw(idx)
        .map(|v| v.is_null())
        .unwrap_or(true);
    if is_null {
        return Value::Null;
    }

    match category {
        TypeCategory::Integer => row
            .try_get::<i64, _>(idx)
            .map(Value::Int)
            .or_else(|_| row.try_get::<u64, _>(idx).map(|n| Value::Int(n as i64)))
            .or_else(|_| row.try_get::<i32, _>(idx).map(|n| Value::Int(n as i64)))
            .unwrap_or(Value::Null),
        TypeCategory::Decimal => row
            .try_get::<Decimal, _>(idx)
            .map(Value::Decimal)
            .or_else(|_| {
                row.try_get::<f64, _>(idx).map(|f| {
                    Decimal::from_f64(f).map(Value::Decimal).unwrap_or(Value::Null)
                })
            })
            .unwrap_or(Value::Null),
        TypeCategory::Boolean => row
            .try_get::<bool, _>(idx)
            .map(Value::Bool)
            .or_else(|_| row.try_get::<i8, _>(idx).map(|n| Value::Bool(n != 0)))
            .unwrap_or(Value::Null),
        TypeCategory::DateTime => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(Value::DateTime)
            .or_else(|_| {
                row.try_get::<NaiveDate, _>(idx)
                    .map(|d| Value::DateTime(d.and_time(chrono::NaiveTime::MIN)))
            })
            .unwrap_or(Value::Null),
        TypeCategory::Json => row
            .try_get::<serde_json::Value, _>(idx)
            .map(Value::Json)
            .or_else(|_| row.try_get::<String, _>(idx).map(Value::Text))
            .unwrap_or(Value::Null),
        TypeCategory::Text => row
            .try_get::<String, _>(idx)
            .map(Value::Text)
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>(idx)
                    .map(|b| Value::Text(String::from_utf8_lossy(&b).into_owned()))
            })
            .unwrap_or(Value::Null),
    }
}
