//! Maps tool calls onto warehouse and credential operations.

use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use quarry_auth::{AuthSession, CredentialSource, OAuthSource};
use quarry_warehouse::WarehouseClient;

use crate::arguments;
use crate::error::{ErrorKind, ToolError};
use crate::tools::{ToolName, ToolRegistry};

/// Runs named tools against the scoped warehouse client.
///
/// This is the boundary where every failure becomes a [`ToolError`].
/// Arguments and dataset scope are checked before any credential is
/// acquired.
#[derive(Clone)]
pub struct ToolDispatcher {
    client: WarehouseClient,
    oauth: Option<Arc<OAuthSource>>,
    registry: ToolRegistry,
}

impl ToolDispatcher {
    /// Dispatcher for a session. `reauth-oauth` is enabled only when the
    /// session uses OAuth.
    pub fn new(client: WarehouseClient, session: &AuthSession) -> Self {
        Self::with_oauth(client, session.oauth().cloned())
    }

    pub fn with_oauth(client: WarehouseClient, oauth: Option<Arc<OAuthSource>>) -> Self {
        let registry = ToolRegistry::standard(oauth.is_some());
        Self {
            client,
            oauth,
            registry,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool call and return its JSON payload.
    #[instrument(skip(self, args), fields(tool = %name))]
    pub async fn dispatch(&self, name: &str, args: Option<Value>) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::unsupported_tool(name))?;

        let result = match tool {
            ToolName::ExecuteQuery => self.execute_query(args).await,
            ToolName::ListTables => self.list_tables(args).await,
            ToolName::DescribeTable => self.describe_table(args).await,
            ToolName::ReauthOAuth => self.reauth_oauth(args).await,
        };

        match &result {
            Ok(_) => info!("Tool call succeeded"),
            Err(e) => warn!(kind = %e.kind, error = %e.message, "Tool call failed"),
        }
        result
    }

    async fn execute_query(&self, args: Option<Value>) -> Result<Value, ToolError> {
        let args = arguments::query_args(args)?;
        self.client.scope().check_query(&args.sql)?;

        let job = self
            .client
            .query_defaults()
            .clone()
            .with_params(args.params)
            .with_dry_run(args.dry_run);
        let result = self.client.execute_query(&args.sql, job).await?;
        to_payload(&result)
    }

    async fn list_tables(&self, args: Option<Value>) -> Result<Value, ToolError> {
        arguments::object(args)?;
        let listing = self.client.list_tables().await?;
        to_payload(&listing)
    }

    async fn describe_table(&self, args: Option<Value>) -> Result<Value, ToolError> {
        let table = arguments::table_args(args)?;
        self.client
            .scope()
            .check_in(table.project.as_deref(), &table.dataset)?;
        let schema = self.client.describe_table(&table).await?;
        to_payload(&schema)
    }

    async fn reauth_oauth(&self, args: Option<Value>) -> Result<Value, ToolError> {
        arguments::object(args)?;
        let oauth = self
            .oauth
            .as_ref()
            .ok_or_else(|| ToolError::unsupported_tool(ToolName::ReauthOAuth.as_str()))?;

        oauth.reset().await?;
        oauth.acquire().await?;
        self.client.probe().await?;

        info!("Re-authenticated with OAuth");
        Ok(json!({
            "status": "authenticated",
            "message": "Signed in again and verified BigQuery access."
        }))
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| {
        ToolError::new(ErrorKind::Transport, format!("failed to encode result: {}", e))
    })
}
