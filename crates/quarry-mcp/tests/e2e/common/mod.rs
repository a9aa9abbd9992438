//! Shared test infrastructure for Quarry MCP end-to-end tests.
//!
//! This module provides:
//! - An in-memory warehouse that records every call it receives
//! - Credential sources (static service account, scripted OAuth provider)
//! - A `TestContext` wiring them into a dispatcher and server

#![allow(dead_code)]

use async_trait::async_trait;
use quarry_auth::oauth::OAuthProvider;
use quarry_auth::{
    AuthError, Credential, CredentialSource, MemoryTokenStore, OAuthSource, OAuthToken,
    SourceKind,
};
use quarry_core::McpConfig;
use quarry_mcp::{McpServer, ToolDispatcher, ToolError};
use quarry_scope::DatasetScope;
use quarry_warehouse::{
    ColumnSchema, QueryJobConfig, QueryResult, Row, TableId, TableSchema, Warehouse,
    WarehouseClient, WarehouseError,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Project the scoped test deployments run in.
pub const PROJECT: &str = "test-project";

// =============================================================================
// WAREHOUSE
// =============================================================================

/// One recorded warehouse call: operation, target and the bearer token used.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub target: String,
    pub token: String,
}

#[derive(Default)]
pub struct FakeWarehouse {
    datasets: Vec<(String, Vec<String>)>,
    calls: Mutex<Vec<Call>>,
    pub query_failure: Option<(u16, String)>,
}

impl FakeWarehouse {
    /// A project with `sales.{orders,customers}` and `hr.{people}`.
    pub fn standard() -> Self {
        Self::with(&[("sales", &["orders", "customers"]), ("hr", &["people"])])
    }

    pub fn with(datasets: &[(&str, &[&str])]) -> Self {
        Self {
            datasets: datasets
                .iter()
                .map(|(d, ts)| (d.to_string(), ts.iter().map(|t| t.to_string()).collect()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, op: &'static str, target: impl Into<String>, credential: &Credential) {
        self.calls.lock().unwrap().push(Call {
            op,
            target: target.into(),
            token: credential.token().to_string(),
        });
    }

    fn tables(&self, dataset: &str) -> Option<&Vec<String>> {
        self.datasets
            .iter()
            .find(|(d, _)| d == dataset)
            .map(|(_, tables)| tables)
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn list_datasets(
        &self,
        credential: &Credential,
        max_results: Option<u32>,
    ) -> Result<Vec<String>, WarehouseError> {
        self.record("list_datasets", "", credential);
        let limit = max_results.map(|m| m as usize).unwrap_or(usize::MAX);
        Ok(self
            .datasets
            .iter()
            .take(limit)
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn list_tables(
        &self,
        credential: &Credential,
        dataset: &str,
    ) -> Result<Vec<String>, WarehouseError> {
        self.record("list_tables", dataset, credential);
        self.tables(dataset)
            .cloned()
            .ok_or_else(|| WarehouseError::NotFound(format!("dataset {dataset} not found")))
    }

    async fn get_table(
        &self,
        credential: &Credential,
        table: &TableId,
    ) -> Result<TableSchema, WarehouseError> {
        self.record("get_table", table.to_string(), credential);
        let exists = self
            .tables(&table.dataset)
            .is_some_and(|tables| tables.contains(&table.table));
        if !exists {
            return Err(WarehouseError::NotFound(format!("table {table} not found")));
        }
        Ok(TableSchema {
            table: table.clone(),
            kind: "TABLE".to_string(),
            description: None,
            num_rows: Some(2),
            columns: vec![column("id", "INTEGER", "REQUIRED"), column("status", "STRING", "NULLABLE")],
        })
    }

    async fn run_query(
        &self,
        credential: &Credential,
        sql: &str,
        job: &QueryJobConfig,
    ) -> Result<QueryResult, WarehouseError> {
        self.record("run_query", sql, credential);
        if let Some((status, message)) = &self.query_failure {
            return Err(WarehouseError::Api {
                status: *status,
                message: message.clone(),
            });
        }
        if job.dry_run {
            return Ok(QueryResult {
                bytes_processed: Some(1024),
                dry_run: true,
                ..Default::default()
            });
        }

        let mut row = Row::new();
        row.insert("id".to_string(), json!(1));
        row.insert("status".to_string(), json!("open"));
        Ok(QueryResult {
            rows: vec![row],
            total_rows: 1,
            truncated: false,
            job_id: Some("job_1".to_string()),
            bytes_processed: Some(2048),
            dry_run: false,
        })
    }
}

fn column(name: &str, data_type: &str, mode: &str) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        mode: mode.to_string(),
        description: None,
        fields: vec![],
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Service-account style source handing out one fixed token.
#[derive(Default)]
pub struct StaticSource {
    pub acquires: AtomicUsize,
}

impl StaticSource {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for StaticSource {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new("sa-token", None))
    }

    async fn invalidate(&self, _credential: &Credential) {}

    fn kind(&self) -> SourceKind {
        SourceKind::ServiceAccount
    }
}

/// OAuth provider that grants consent instantly and counts every network step.
#[derive(Default)]
pub struct ScriptedProvider {
    pub authorizes: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub deny: bool,
}

impl ScriptedProvider {
    pub fn authorizes(&self) -> usize {
        self.authorizes.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthProvider for ScriptedProvider {
    async fn authorize(&self) -> Result<OAuthToken, AuthError> {
        let n = self.authorizes.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.deny {
            return Err(AuthError::AuthorizationDenied("access_denied".to_string()));
        }
        Ok(OAuthToken::new(
            format!("access-{n}"),
            format!("refresh-{n}"),
            3600,
            vec![],
        ))
    }

    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(token.refreshed(format!("refreshed-{n}"), 3600, None))
    }
}

/// A saved token whose access token has already expired.
pub fn expired_token() -> OAuthToken {
    OAuthToken::new("stale-access", "saved-refresh", -300, vec![])
}

/// A saved token that is still valid.
pub fn valid_token() -> OAuthToken {
    OAuthToken::new("saved-access", "saved-refresh", 3600, vec![])
}

// =============================================================================
// TEST CONTEXT
// =============================================================================

pub struct TestContext {
    pub warehouse: Arc<FakeWarehouse>,
    pub dispatcher: ToolDispatcher,
    pub sa: Option<Arc<StaticSource>>,
    pub oauth: Option<Arc<OAuthSource>>,
    pub provider: Option<Arc<ScriptedProvider>>,
    pub store: Option<Arc<MemoryTokenStore>>,
}

impl TestContext {
    /// Service-account deployment.
    pub fn service_account(warehouse: FakeWarehouse, allowed: &[&str]) -> Self {
        let warehouse = Arc::new(warehouse);
        let source = Arc::new(StaticSource::default());
        let client = WarehouseClient::new(
            warehouse.clone(),
            source.clone(),
            DatasetScope::new(allowed.iter().copied()).with_project(PROJECT),
        );
        Self {
            warehouse,
            dispatcher: ToolDispatcher::with_oauth(client, None),
            sa: Some(source),
            oauth: None,
            provider: None,
            store: None,
        }
    }

    /// OAuth deployment starting from `saved` in the token store.
    pub fn oauth(
        warehouse: FakeWarehouse,
        allowed: &[&str],
        provider: ScriptedProvider,
        saved: Option<OAuthToken>,
    ) -> Self {
        let warehouse = Arc::new(warehouse);
        let provider = Arc::new(provider);
        let store = Arc::new(match saved {
            Some(token) => MemoryTokenStore::with_token(token),
            None => MemoryTokenStore::new(),
        });
        let source = Arc::new(OAuthSource::new(
            provider.clone(),
            store.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        ));
        let client = WarehouseClient::new(
            warehouse.clone(),
            source.clone(),
            DatasetScope::new(allowed.iter().copied()).with_project(PROJECT),
        );
        Self {
            warehouse,
            dispatcher: ToolDispatcher::with_oauth(client, Some(source.clone())),
            sa: None,
            oauth: Some(source),
            provider: Some(provider),
            store: Some(store),
        }
    }

    pub async fn call(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        self.dispatcher.dispatch(tool, Some(args)).await
    }

    pub fn server(&self) -> Arc<McpServer> {
        Arc::new(McpServer::new(
            McpConfig::default(),
            self.dispatcher.clone(),
            CancellationToken::new(),
        ))
    }

    pub fn provider(&self) -> &ScriptedProvider {
        self.provider.as_deref().expect("OAuth context")
    }

    pub fn oauth_source(&self) -> &OAuthSource {
        self.oauth.as_deref().expect("OAuth context")
    }

    pub fn acquires(&self) -> usize {
        self.sa.as_ref().map(|s| s.acquires()).unwrap_or(0)
    }
}
