use std::convert::TryFrom;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

use crate::store::{Row, StoreError, Table};

/// Columns stored as canonical RFC 3339 text.
const TIMESTAMP_COLUMNS: [&str; 3] = ["created_at", "updated_at", "timestamp"];

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_datetime(Utc::now())
}

pub fn is_timestamp_column(column: &str) -> bool {
    TIMESTAMP_COLUMNS.contains(&column)
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote `column` after checking it belongs to `table`.
pub fn column_ident(table: Table, column: &str) -> Result<String> {
    if !table.has_column(column) {
        return Err(StoreError::query(format!("unknown column {column} on {table}")).into());
    }
    Ok(quote_ident(column))
}

pub fn select_list(table: Table) -> String {
    table
        .columns()
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a JSON value bound for `column` into an SQLite value. Timestamp
/// columns are rewritten to the canonical text form so they sort correctly.
pub fn bind_value(column: &str, value: &Value) -> Result<SqlValue> {
    let bound = match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => match number.as_f64() {
                Some(real) => SqlValue::Real(real),
                None => bail!("{column} holds a number SQLite cannot store: {number}"),
            },
        },
        Value::String(text) if is_timestamp_column(column) => {
            let parsed = parse_datetime(text, column)
                .map_err(|err| StoreError::query(format!("{err:#}")))?;
            SqlValue::Text(format_datetime(parsed))
        }
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(StoreError::query(format!("{column} cannot hold a nested value")).into())
        }
    };
    Ok(bound)
}

pub fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::Number(int.into()),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Read a row selected with [`select_list`] into a JSON row.
pub fn row_to_json(table: Table, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (index, column) in table.columns().iter().enumerate() {
        out.insert((*column).to_string(), read_value(row.get_ref(index)?));
    }
    Ok(out)
}
