//! BigQuery REST v2 adapter.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use quarry_auth::Credential;
use quarry_core::QuarryConfig;

use crate::decode::decode_row;
use crate::error::WarehouseError;
use crate::schema::{ColumnSchema, QueryJobConfig, QueryResult, TableId, TableSchema};
use crate::warehouse::Warehouse;

/// Longest single wait passed to the API while a job runs.
const POLL_WAIT: Duration = Duration::from_secs(10);

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetEntry {
    dataset_reference: DatasetReference,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    table_reference: TableReference,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(default)]
    schema: Option<SchemaResource>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    num_rows: Option<String>,
}

#[derive(Deserialize)]
struct SchemaResource {
    #[serde(default)]
    fields: Vec<ColumnSchema>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    schema: Option<SchemaResource>,
    #[serde(default)]
    rows: Vec<Value>,
    total_rows: Option<String>,
    page_token: Option<String>,
    total_bytes_processed: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

/// A submitted job that has an ID to poll.
struct RunningJob {
    job_id: String,
    location: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    location: &'a str,
    timeout_ms: u64,
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_bytes_billed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    query_parameters: Vec<Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// BigQuery adapter over the v2 REST API.
#[derive(Debug, Clone)]
pub struct BigQueryRest {
    http: reqwest::Client,
    base_url: String,
    project: String,
    location: String,
}

impl BigQueryRest {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
            location: location.into(),
        }
    }

    /// Adapter for the configured project, location and API base URL.
    pub fn from_config(config: &QuarryConfig) -> Result<Self, WarehouseError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self::new(
            http,
            &config.bigquery.api_base_url,
            &config.project,
            &config.location,
        ))
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn project_url(&self, project: &str) -> String {
        format!(
            "{}/projects/{}",
            self.base_url,
            urlencoding::encode(project)
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> Result<reqwest::Response, WarehouseError> {
        let response = request
            .header(AUTHORIZATION, credential.authorization_header())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => envelope.error.message,
            Err(_) if body.trim().is_empty() => status.to_string(),
            Err(_) => body,
        };
        warn!(status = status.as_u16(), message = %message, "BigQuery API error");

        Err(match status.as_u16() {
            401 => WarehouseError::Unauthorized(message),
            403 => WarehouseError::PermissionDenied(message),
            404 => WarehouseError::NotFound(message),
            code => WarehouseError::Api {
                status: code,
                message,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, WarehouseError> {
        let response = self.send(self.http.get(url).query(query), credential).await?;
        decode_body(response).await
    }

    async fn query_results(
        &self,
        credential: &Credential,
        job: &RunningJob,
        page_token: Option<&str>,
        wait: Duration,
        max_results: Option<usize>,
    ) -> Result<QueryResponse, WarehouseError> {
        let url = format!(
            "{}/queries/{}",
            self.project_url(&self.project),
            urlencoding::encode(&job.job_id)
        );

        let mut query = vec![
            (
                "location",
                job.location.clone().unwrap_or_else(|| self.location.clone()),
            ),
            ("timeoutMs", wait.as_millis().to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        if let Some(max) = max_results {
            query.push(("maxResults", max.to_string()));
        }

        self.get_json(credential, &url, &query).await
    }
}

async fn decode_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, WarehouseError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| WarehouseError::Decode(e.to_string()))
}

fn parameter_json(param: &crate::schema::QueryParameter) -> Value {
    let value = match &param.value {
        Value::Null => json!({}),
        Value::String(s) => json!({ "value": s }),
        other => json!({ "value": other.to_string() }),
    };
    json!({
        "name": param.name,
        "parameterType": { "type": param.type_name() },
        "parameterValue": value,
    })
}

fn parse_count(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.parse().ok())
}

#[async_trait]
impl Warehouse for BigQueryRest {
    #[instrument(skip(self, credential), fields(project = %self.project))]
    async fn list_datasets(
        &self,
        credential: &Credential,
        max_results: Option<u32>,
    ) -> Result<Vec<String>, WarehouseError> {
        let url = format!("{}/datasets", self.project_url(&self.project));
        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(max) = max_results {
                query.push(("maxResults", max.to_string()));
            }
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: DatasetList = self.get_json(credential, &url, &query).await?;
            datasets.extend(page.datasets.into_iter().map(|d| d.dataset_reference.dataset_id));

            match page.next_page_token {
                Some(token) if max_results.is_none() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = datasets.len(), "Listed datasets");
        Ok(datasets)
    }

    #[instrument(skip(self, credential), fields(project = %self.project))]
    async fn list_tables(
        &self,
        credential: &Credential,
        dataset: &str,
    ) -> Result<Vec<String>, WarehouseError> {
        let url = format!(
            "{}/datasets/{}/tables",
            self.project_url(&self.project),
            urlencoding::encode(dataset)
        );
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, String)> = page_token
                .take()
                .map(|token| vec![("pageToken", token)])
                .unwrap_or_default();

            let page: TableList = self.get_json(credential, &url, &query).await?;
            tables.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = tables.len(), "Listed tables");
        Ok(tables)
    }

    #[instrument(skip(self, credential), fields(table = %table))]
    async fn get_table(
        &self,
        credential: &Credential,
        table: &TableId,
    ) -> Result<TableSchema, WarehouseError> {
        let project = table.project.as_deref().unwrap_or(&self.project);
        let url = format!(
            "{}/datasets/{}/tables/{}",
            self.project_url(project),
            urlencoding::encode(&table.dataset),
            urlencoding::encode(&table.table)
        );

        let resource: TableResource = self.get_json(credential, &url, &[]).await?;
        Ok(TableSchema {
            table: table.clone(),
            kind: resource.kind.unwrap_or_else(|| "TABLE".to_string()),
            description: resource.description,
            num_rows: parse_count(resource.num_rows.as_deref()),
            columns: resource.schema.map(|s| s.fields).unwrap_or_default(),
        })
    }

    #[instrument(skip(self, credential, sql, job), fields(dry_run = job.dry_run))]
    async fn run_query(
        &self,
        credential: &Credential,
        sql: &str,
        job: &QueryJobConfig,
    ) -> Result<QueryResult, WarehouseError> {
        let deadline = Instant::now() + job.timeout;
        let wait = || {
            deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_WAIT)
        };

        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            location: &self.location,
            timeout_ms: wait().as_millis() as u64,
            dry_run: job.dry_run,
            maximum_bytes_billed: job.maximum_bytes_billed.map(|b| b.to_string()),
            max_results: job.max_rows,
            parameter_mode: (!job.params.is_empty()).then_some("NAMED"),
            query_parameters: job.params.iter().map(parameter_json).collect(),
        };

        let url = format!("{}/queries", self.project_url(&self.project));
        let response = self
            .send(self.http.post(&url).json(&request), credential)
            .await?;
        let mut response: QueryResponse = decode_body(response).await?;

        let job_id = response
            .job_reference
            .as_ref()
            .and_then(|j| j.job_id.clone());
        if job.dry_run {
            return Ok(QueryResult {
                job_id,
                bytes_processed: parse_count(response.total_bytes_processed.as_deref()),
                dry_run: true,
                ..Default::default()
            });
        }

        let job_ref = RunningJob {
            job_id: job_id
                .clone()
                .ok_or_else(|| WarehouseError::Decode("query response has no job ID".to_string()))?,
            location: response.job_reference.as_ref().and_then(|j| j.location.clone()),
        };

        while !response.job_complete {
            let remaining = wait();
            if remaining.is_zero() {
                warn!(job_id = %job_ref.job_id, "Query job timed out");
                return Err(WarehouseError::Timeout(job.timeout));
            }
            debug!(job_id = %job_ref.job_id, "Waiting for query job");
            response = self
                .query_results(credential, &job_ref, None, remaining, job.max_rows)
                .await?;
        }

        let fields = response.schema.take().map(|s| s.fields).unwrap_or_default();
        let total_rows = parse_count(response.total_rows.as_deref()).unwrap_or(0);
        let bytes_processed = parse_count(response.total_bytes_processed.as_deref());
        let cap = job.max_rows.unwrap_or(usize::MAX);

        let mut rows = Vec::new();
        let mut page = response;
        loop {
            for raw in &page.rows {
                if rows.len() >= cap {
                    break;
                }
                rows.push(decode_row(&fields, raw)?);
            }

            match page.page_token.take() {
                Some(token) if rows.len() < cap => {
                    page = self
                        .query_results(
                            credential,
                            &job_ref,
                            Some(&token),
                            wait().max(Duration::from_secs(1)),
                            Some(cap - rows.len()).filter(|_| job.max_rows.is_some()),
                        )
                        .await?;
                }
                _ => break,
            }
        }

        let truncated = (rows.len() as u64) < total_rows;
        debug!(rows = rows.len(), total_rows, truncated, "Query complete");
        Ok(QueryResult {
            rows,
            total_rows,
            truncated,
            job_id,
            bytes_processed,
            dry_run: false,
        })
    }
}
