//! Configuration types for the Quarry BigQuery MCP server.
//!
//! A deployment is described by a single `quarry.yaml` file (optional) that
//! the CLI overlays with command-line flags and environment variables. The
//! result is a validated, immutable [`QuarryConfig`] handed to the core.
//!
//! # Example
//!
//! ```yaml
//! project: analytics-prod
//! location: EU
//! datasets: [sales, marketing]
//! auth:
//!   oauth_flow: true
//! oauth:
//!   client_secrets: client_secrets.json
//!   token_file: token.json
//! ```

pub mod auth;
pub mod bigquery;
pub mod logging;
pub mod mcp;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use auth::{AuthConfig, AuthMode, CLOUD_PLATFORM_SCOPE, OAuthConfig};
pub use bigquery::BigQueryConfig;
pub use logging::LoggingConfig;
pub use mcp::{McpConfig, Transport};

use crate::error::ConfigError;

/// Complete Quarry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct QuarryConfig {
    /// Google Cloud project that owns the query jobs.
    #[serde(default)]
    pub project: String,

    /// BigQuery location (e.g. `US`, `EU`, `europe-west1`).
    #[serde(default)]
    pub location: String,

    /// Dataset allow-list. Empty means every dataset is visible.
    #[serde(default)]
    pub datasets: Vec<String>,

    /// Credential selection.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Interactive OAuth settings (used when `auth.oauth_flow` is set).
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// BigQuery API and query settings.
    #[serde(default)]
    pub bigquery: BigQueryConfig,

    /// MCP server settings.
    #[serde(default)]
    pub mcp: McpConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl QuarryConfig {
    /// Load configuration from a YAML file.
    ///
    /// Relative paths inside the file (key file, client secrets, token file,
    /// log file) are resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_relative_paths(&base_dir);

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Check the invariants the core relies on.
    ///
    /// Called once at startup; any error here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.trim().is_empty() {
            return Err(ConfigError::Missing("project"));
        }
        if self.location.trim().is_empty() {
            return Err(ConfigError::Missing("location"));
        }
        if let Some(empty) = self.datasets.iter().position(|d| d.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "datasets",
                reason: format!("entry {} is empty", empty),
            });
        }

        if let AuthMode::OAuth = self.auth.mode()? {
            self.oauth.validate()?;
        }

        if self.bigquery.query_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "bigquery.query_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        self.mcp.validate()?;

        Ok(())
    }

    /// Resolve the authentication mode (see [`AuthConfig::mode`]).
    pub fn auth_mode(&self) -> Result<AuthMode, ConfigError> {
        self.auth.mode()
    }

    fn resolve_relative_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base_dir.join(p)
            }
        };

        if let Some(key_file) = &self.auth.key_file {
            self.auth.key_file = Some(resolve(key_file));
        }
        self.oauth.token_file = resolve(&self.oauth.token_file);
        if !self.oauth.client_secrets_is_inline() {
            let secrets = resolve(&PathBuf::from(&self.oauth.client_secrets));
            self.oauth.client_secrets = secrets.to_string_lossy().into_owned();
        }
        if let Some(log_file) = &self.logging.file {
            self.logging.file = Some(resolve(log_file));
        }
    }
}
