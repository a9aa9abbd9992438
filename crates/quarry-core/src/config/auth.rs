//! Credential selection.
//!
//! Exactly one strategy is active per process: a service account (explicit
//! key file or ambient default credentials) or the interactive OAuth flow.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Scope requested for every credential.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Raw authentication settings, as written in the config file or flags.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Service account key file. When absent (and OAuth is off) ambient
    /// default credentials are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Use the interactive browser-based OAuth flow.
    #[serde(default)]
    pub oauth_flow: bool,
}

/// The resolved authentication strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Service account key file, or ambient default credentials when `None`.
    ServiceAccount { key_file: Option<PathBuf> },
    /// Interactive OAuth with a persisted refresh token.
    OAuth,
}

impl AuthConfig {
    /// Resolve the strategy. A key file together with the OAuth flag is a
    /// configuration error.
    pub fn mode(&self) -> Result<AuthMode, ConfigError> {
        match (&self.key_file, self.oauth_flow) {
            (Some(_), true) => Err(ConfigError::ConflictingAuthModes),
            (_, true) => Ok(AuthMode::OAuth),
            (key_file, false) => Ok(AuthMode::ServiceAccount {
                key_file: key_file.clone(),
            }),
        }
    }
}

/// Settings for the interactive OAuth flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthConfig {
    /// Client secrets: a path to the downloaded JSON file, or the JSON
    /// content itself.
    #[serde(default = "default_client_secrets")]
    pub client_secrets: String,

    /// Where the refresh token is persisted.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Port of the local redirect listener. 0 picks a free port.
    #[serde(default)]
    pub callback_port: u16,

    /// How long an interactive authorization may block a request.
    #[serde(default = "default_authorization_timeout_secs")]
    pub authorization_timeout_secs: u64,

    /// Launch the system browser. When false the consent URL is only logged.
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// Requested scopes.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_secrets: default_client_secrets(),
            token_file: default_token_file(),
            callback_port: 0,
            authorization_timeout_secs: default_authorization_timeout_secs(),
            open_browser: true,
            scopes: default_scopes(),
        }
    }
}

impl OAuthConfig {
    /// Whether `client_secrets` holds JSON content rather than a path.
    pub fn client_secrets_is_inline(&self) -> bool {
        self.client_secrets.trim_start().starts_with('{')
    }

    /// Authorization timeout as a [`Duration`].
    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.client_secrets.trim().is_empty() {
            return Err(ConfigError::Missing("oauth.client_secrets"));
        }
        if self.token_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("oauth.token_file"));
        }
        if self.authorization_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "oauth.authorization_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.scopes.is_empty() {
            return Err(ConfigError::Missing("oauth.scopes"));
        }
        Ok(())
    }
}

fn default_client_secrets() -> String {
    "client_secrets.json".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_authorization_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_scopes() -> Vec<String> {
    vec![CLOUD_PLATFORM_SCOPE.to_string()]
}
