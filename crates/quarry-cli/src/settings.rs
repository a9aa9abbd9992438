//! Configuration assembly: YAML file, then flags and environment.

use anyhow::{Context, Result};
use clap::Args;
use quarry_core::{QuarryConfig, Transport};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CONFIG_FILE: &str = "quarry.yaml";

/// Flags shared by every command that needs a configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file. Defaults to ./quarry.yaml when present.
    #[arg(short, long, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Google Cloud project that runs the query jobs.
    #[arg(long, env = "BIGQUERY_PROJECT")]
    pub project: Option<String>,

    /// BigQuery location, e.g. US, EU or europe-west1.
    #[arg(long, env = "BIGQUERY_LOCATION")]
    pub location: Option<String>,

    /// Comma-separated dataset allow-list. Empty means every dataset.
    #[arg(long, env = "BIGQUERY_DATASETS", value_delimiter = ',')]
    pub datasets: Option<Vec<String>>,

    /// Service account key file.
    #[arg(long, env = "BIGQUERY_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Sign in with the OAuth installed-app flow instead of a service account.
    #[arg(long, env = "BIGQUERY_OAUTH_FLOW")]
    pub oauth_flow: bool,

    /// OAuth client secrets file, or the client secrets JSON itself.
    #[arg(long, env = "GOOGLE_CLIENT_SECRETS_FILE")]
    pub client_secrets: Option<String>,

    /// Where the OAuth token is saved.
    #[arg(long, env = "GOOGLE_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Do not open a browser; print the consent URL instead.
    #[arg(long)]
    pub no_browser: bool,

    /// Log filter (overridden by RUST_LOG).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write logs to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Transport flags for `serve`.
#[derive(Debug, Clone, Default, Args)]
pub struct TransportArgs {
    /// Transport type (stdio or http).
    #[arg(long, env = "QUARRY_TRANSPORT")]
    pub transport: Option<Transport>,

    /// HTTP bind host (http transport only).
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port (http transport only).
    #[arg(long)]
    pub port: Option<u16>,
}

impl ConfigArgs {
    /// Load the file (if any), apply overrides and validate.
    pub fn load(&self) -> Result<QuarryConfig> {
        let mut config = match self.config_path() {
            Some(path) => QuarryConfig::from_file(&path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => QuarryConfig::default(),
        };
        self.apply(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                default.exists().then(|| default.to_path_buf())
            }
        }
    }

    /// Overlay flags and environment values onto `config`.
    pub fn apply(&self, config: &mut QuarryConfig) {
        if let Some(project) = &self.project {
            config.project = project.clone();
        }
        if let Some(location) = &self.location {
            config.location = location.clone();
        }
        if let Some(datasets) = &self.datasets {
            config.datasets = datasets
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Some(key_file) = &self.key_file {
            config.auth.key_file = Some(key_file.clone());
        }
        if self.oauth_flow {
            config.auth.oauth_flow = true;
        }
        if let Some(secrets) = &self.client_secrets {
            config.oauth.client_secrets = secrets.clone();
        }
        if let Some(token_file) = &self.token_file {
            config.oauth.token_file = token_file.clone();
        }
        if self.no_browser {
            config.oauth.open_browser = false;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
        debug!("Applied command-line overrides");
    }
}

impl TransportArgs {
    pub fn apply(&self, config: &mut QuarryConfig) {
        if let Some(transport) = self.transport {
            config.mcp.transport = transport;
        }
        if let Some(host) = &self.host {
            config.mcp.host = host.clone();
        }
        if let Some(port) = self.port {
            config.mcp.port = port;
        }
    }
}
