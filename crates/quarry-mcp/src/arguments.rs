//! Tool argument validation.
//!
//! Every tool call is turned into a typed argument struct here, before any
//! credential is acquired or any request is sent.

use serde_json::{Map, Value};

use quarry_warehouse::{QueryParameter, TableId};

use crate::error::ToolError;

/// Arguments of `execute-query`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub sql: String,
    pub params: Vec<QueryParameter>,
    pub dry_run: bool,
}

/// Read the argument object. A missing or `null` object counts as empty.
pub fn object(args: Option<Value>) -> Result<Map<String, Value>, ToolError> {
    match args {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(ToolError::validation(format!(
            "arguments must be an object, got {}",
            type_name(&other)
        ))),
    }
}

pub fn query_args(args: Option<Value>) -> Result<QueryArgs, ToolError> {
    let args = object(args)?;

    let sql = optional_string(&args, "sql")?
        .or(optional_string(&args, "query")?)
        .ok_or_else(|| ToolError::validation("missing required argument 'sql'"))?;
    if sql.trim().is_empty() {
        return Err(ToolError::validation("argument 'sql' must not be empty"));
    }

    let params = match args.get("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| parameter(name, value))
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(ToolError::validation(format!(
                "argument 'params' must be an object, got {}",
                type_name(other)
            )));
        }
    };

    let dry_run = match args.get("dry_run") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(ToolError::validation(format!(
                "argument 'dry_run' must be a boolean, got {}",
                type_name(other)
            )));
        }
    };

    Ok(QueryArgs {
        sql: sql.to_string(),
        params,
        dry_run,
    })
}

/// Arguments of `describe-table`: `dataset` + `table`, or `table_name`.
pub fn table_args(args: Option<Value>) -> Result<TableId, ToolError> {
    let args = object(args)?;

    if let Some(name) = optional_string(&args, "table_name")? {
        return TableId::parse(name).ok_or_else(|| {
            ToolError::validation(format!(
                "table_name '{}' must be dataset.table or project.dataset.table",
                name
            ))
        });
    }

    let dataset = required_identifier(&args, "dataset")?;
    let table = required_identifier(&args, "table")?;

    // `table` may itself be qualified, e.g. {"dataset": "sales", "table": "sales.orders"}.
    if table.contains('.') {
        let id = TableId::parse(table).ok_or_else(|| {
            ToolError::validation(format!("table '{}' is not a valid table name", table))
        })?;
        if id.dataset != dataset {
            return Err(ToolError::validation(format!(
                "table '{}' does not belong to dataset '{}'",
                table, dataset
            )));
        }
        return Ok(id);
    }

    Ok(TableId::new(dataset, table))
}

fn parameter(name: &str, value: &Value) -> Result<QueryParameter, ToolError> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {
            Ok(QueryParameter::new(name, value.clone()))
        }
        other => Err(ToolError::validation(format!(
            "query parameter '{}' must be a string, number or boolean, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn optional_string<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ToolError::validation(format!(
            "argument '{}' must be a string, got {}",
            key,
            type_name(other)
        ))),
    }
}

fn required_identifier<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ToolError> {
    let value = optional_string(args, key)?
        .map(|s| s.trim().trim_matches('`'))
        .ok_or_else(|| ToolError::validation(format!("missing required argument '{}'", key)))?;
    if value.is_empty() {
        return Err(ToolError::validation(format!(
            "argument '{}' must not be empty",
            key
        )));
    }
    Ok(value)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
