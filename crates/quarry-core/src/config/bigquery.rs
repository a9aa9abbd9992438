//! BigQuery API and query execution settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the BigQuery REST adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BigQueryConfig {
    /// Base URL of the BigQuery v2 REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// How long to wait for a query job to complete.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Maximum rows returned by a single `execute-query` call.
    #[serde(default = "default_max_rows")]
    pub max_rows: Option<usize>,

    /// Upper bound on bytes billed per query job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<u64>,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            query_timeout_secs: default_query_timeout_secs(),
            max_rows: default_max_rows(),
            maximum_bytes_billed: None,
        }
    }
}

impl BigQueryConfig {
    /// Query timeout as a [`Duration`].
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn default_api_base_url() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_query_timeout_secs() -> u64 {
    120
}

fn default_max_rows() -> Option<usize> {
    Some(10_000)
}
