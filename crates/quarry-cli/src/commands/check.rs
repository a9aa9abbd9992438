//! `quarry check`: validate configuration and, unless offline, reach BigQuery.

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use quarry_auth::AuthSession;
use quarry_mcp::ToolDispatcher;

use crate::commands::serve::build_dispatcher;
use crate::logging;
use crate::settings::ConfigArgs;

/// Arguments for `quarry check`.
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Only validate the configuration; make no network calls.
    #[arg(long)]
    pub offline: bool,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    let config = args.config.load()?;
    println!("✓ Configuration is valid");
    println!("  Project:  {}", config.project);
    println!("  Location: {}", config.location);
    if config.datasets.is_empty() {
        println!("  Datasets: all");
    } else {
        println!("  Datasets: {}", config.datasets.join(", "));
    }

    if args.offline {
        return Ok(());
    }
    logging::init(&config.logging)?;

    let session = AuthSession::from_config(&config, CancellationToken::new())
        .await
        .context("Failed to set up credentials")?;
    println!("✓ Credential source: {}", session.kind());

    let dispatcher: ToolDispatcher = build_dispatcher(&config, &session)?;
    let listing = dispatcher
        .dispatch("list-tables", None)
        .await
        .context("Failed to list tables")?;
    session.shutdown().await;

    let tables = listing["tables"].as_array().map(Vec::len).unwrap_or(0);
    println!("✓ BigQuery reachable, {} visible tables", tables);
    if let Some(skipped) = listing["skipped"].as_array() {
        for entry in skipped {
            println!(
                "  ! skipped {}: {}",
                entry["dataset"].as_str().unwrap_or("?"),
                entry["reason"].as_str().unwrap_or("")
            );
        }
    }
    Ok(())
}
