//! Decoding of the BigQuery `f`/`v` row format into typed JSON.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::error::WarehouseError;
use crate::schema::{ColumnSchema, Row};

/// Decode one `{"f": [{"v": ...}, ...]}` row against the schema fields.
pub fn decode_row(fields: &[ColumnSchema], row: &Value) -> Result<Row, WarehouseError> {
    let cells = row
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| WarehouseError::Decode("row without an \"f\" array".to_string()))?;

    if cells.len() != fields.len() {
        return Err(WarehouseError::Decode(format!(
            "row has {} cells but the schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut decoded = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        let value = cell.get("v").unwrap_or(&Value::Null);
        decoded.insert(field.name.clone(), decode_field(field, value)?);
    }
    Ok(decoded)
}

fn decode_field(field: &ColumnSchema, value: &Value) -> Result<Value, WarehouseError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if field.is_repeated() {
        let items = value.as_array().ok_or_else(|| {
            WarehouseError::Decode(format!("repeated field {} is not an array", field.name))
        })?;
        return items
            .iter()
            .map(|item| decode_scalar_or_record(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }

    decode_scalar_or_record(field, value)
}

fn decode_scalar_or_record(field: &ColumnSchema, value: &Value) -> Result<Value, WarehouseError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if field.is_record() {
        return decode_row(&field.fields, value).map(Value::Object);
    }

    let Some(text) = value.as_str() else {
        return Ok(value.clone());
    };

    let decoded = match field.data_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "FLOAT" | "FLOAT64" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        "BOOLEAN" | "BOOL" => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::String(other.to_string()),
        },
        "TIMESTAMP" => timestamp(text)
            .map(|ts| Value::String(ts.to_rfc3339()))
            .unwrap_or_else(|| Value::String(text.to_string())),
        // NUMERIC, BIGNUMERIC, DATE, DATETIME, TIME, BYTES, GEOGRAPHY, JSON, STRING
        _ => Value::String(text.to_string()),
    };
    Ok(decoded)
}

/// TIMESTAMP cells are epoch seconds, possibly fractional or in E notation.
fn timestamp(text: &str) -> Option<DateTime<Utc>> {
    let seconds: f64 = text.parse().ok()?;
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros)
}
