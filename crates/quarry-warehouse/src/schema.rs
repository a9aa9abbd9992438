//! Table, column and query result types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use quarry_core::BigQueryConfig;

/// A table inside a visible dataset, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Fully or partially qualified table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableId {
    /// Owning project. `None` means the configured project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: None,
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parse `dataset.table` or `project.dataset.table`, with optional
    /// backticks.
    pub fn parse(name: &str) -> Option<Self> {
        let unquoted: String = name.trim().chars().filter(|c| *c != '`').collect();
        let parts: Vec<&str> = unquoted.split('.').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [dataset, table] => Some(Self::new(*dataset, *table)),
            [project, dataset, table] => Some(Self {
                project: Some(project.to_string()),
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{}.{}.{}", project, self.dataset, self.table),
            None => write!(f, "{}.{}", self.dataset, self.table),
        }
    }
}

/// One column of a table schema. Nested `RECORD` columns carry `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ColumnSchema>,
}

impl ColumnSchema {
    pub fn is_repeated(&self) -> bool {
        self.mode.eq_ignore_ascii_case("REPEATED")
    }

    pub fn is_record(&self) -> bool {
        matches!(
            self.data_type.to_ascii_uppercase().as_str(),
            "RECORD" | "STRUCT"
        )
    }
}

fn default_mode() -> String {
    "NULLABLE".to_string()
}

/// Schema descriptor returned by `describe-table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: TableId,
    /// `TABLE`, `VIEW`, `MATERIALIZED_VIEW`, `EXTERNAL`, ...
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_rows: Option<u64>,
    /// Columns in table order.
    pub columns: Vec<ColumnSchema>,
}

/// A dataset whose tables could not be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDataset {
    pub dataset: String,
    pub reason: String,
}

/// Result of `list-tables`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableListing {
    /// Tables ordered by dataset enumeration order, then table order.
    pub tables: Vec<TableRef>,
    /// Datasets that failed to enumerate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedDataset>,
}

/// One result row: column name to value, in schema order.
pub type Row = Map<String, Value>;

/// Named query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// BigQuery type inferred from the JSON value.
    pub fn type_name(&self) -> &'static str {
        match &self.value {
            Value::Bool(_) => "BOOL",
            Value::Number(n) if n.is_i64() || n.is_u64() => "INT64",
            Value::Number(_) => "FLOAT64",
            _ => "STRING",
        }
    }
}

/// Per-job settings for `execute_query`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryJobConfig {
    pub params: Vec<QueryParameter>,
    pub dry_run: bool,
    /// Stop collecting rows after this many.
    pub max_rows: Option<usize>,
    pub maximum_bytes_billed: Option<u64>,
    /// How long to wait for the job.
    pub timeout: Duration,
}

impl Default for QueryJobConfig {
    fn default() -> Self {
        Self::from_config(&BigQueryConfig::default())
    }
}

impl QueryJobConfig {
    /// Defaults taken from configuration.
    pub fn from_config(config: &BigQueryConfig) -> Self {
        Self {
            params: Vec::new(),
            dry_run: false,
            max_rows: config.max_rows,
            maximum_bytes_billed: config.maximum_bytes_billed,
            timeout: config.query_timeout(),
        }
    }

    pub fn with_params(mut self, params: Vec<QueryParameter>) -> Self {
        self.params = params;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Rows and job statistics from `execute_query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Rows the query produced, which may exceed `rows.len()`.
    pub total_rows: u64,
    /// Whether `rows` was cut off at `max_rows`.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_processed: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}
