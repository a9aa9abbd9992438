//! `quarry serve`: run the MCP server until stdin closes or a signal arrives.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use quarry_auth::AuthSession;
use quarry_core::QuarryConfig;
use quarry_mcp::{McpServer, ToolDispatcher};
use quarry_scope::DatasetScope;
use quarry_warehouse::{BigQueryRest, QueryJobConfig, WarehouseClient};

use crate::logging;
use crate::settings::{ConfigArgs, TransportArgs};

/// Arguments for `quarry serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub transport: TransportArgs,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let mut config = args.config.load()?;
    args.transport.apply(&mut config);
    logging::init(&config.logging)?;

    info!(
        project = %config.project,
        location = %config.location,
        datasets = ?config.datasets,
        transport = ?config.mcp.transport,
        "Starting Quarry"
    );

    let cancel = CancellationToken::new();
    let session = AuthSession::from_config(&config, cancel.clone())
        .await
        .context("Failed to set up credentials")?;
    info!(source = %session.kind(), "Credential source ready");

    let dispatcher = build_dispatcher(&config, &session)?;
    let server = Arc::new(McpServer::new(
        config.mcp.clone(),
        dispatcher,
        cancel.clone(),
    ));

    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));
    let result = server.run().await;

    session.shutdown().await;
    signals.abort();
    info!("Quarry stopped");

    result.context("MCP server failed")
}

/// Wire the warehouse client and dispatcher for a session.
pub fn build_dispatcher(config: &QuarryConfig, session: &AuthSession) -> Result<ToolDispatcher> {
    let warehouse = BigQueryRest::from_config(config).context("Failed to create BigQuery client")?;
    let client = WarehouseClient::new(
        Arc::new(warehouse),
        session.credentials(),
        DatasetScope::new(&config.datasets).with_project(&config.project),
    )
    .with_query_defaults(QueryJobConfig::from_config(&config.bigquery));
    Ok(ToolDispatcher::new(client, session))
}

async fn cancel_on_signal(cancel: CancellationToken) {
    shutdown_signal().await;
    info!("Shutdown signal received");
    cancel.cancel();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C stops the server");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
