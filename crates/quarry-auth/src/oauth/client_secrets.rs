//! OAuth client secrets as downloaded from the Cloud console.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::endpoint::GOOGLE_TOKEN_URL;
use crate::error::AuthError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Client identity used for the authorization code flow.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct SecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Load from a file path, or parse directly when `source` is inline JSON.
    pub fn load(source: &str) -> Result<Self, AuthError> {
        if source.trim_start().starts_with('{') {
            return Self::from_json(source);
        }

        let path = Path::new(source);
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::ClientSecrets(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Parse an `installed` or `web` client secrets document.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: SecretsFile =
            serde_json::from_str(json).map_err(|e| AuthError::ClientSecrets(e.to_string()))?;

        let secrets = file.installed.or(file.web).ok_or_else(|| {
            AuthError::ClientSecrets("expected an \"installed\" or \"web\" client".to_string())
        })?;

        if secrets.client_id.trim().is_empty() {
            return Err(AuthError::ClientSecrets("client_id is empty".to_string()));
        }
        Ok(secrets)
    }
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}
