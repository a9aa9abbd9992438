//! OAuth 2.0 token endpoint client shared by every grant type.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AuthError;

/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    /// Space-separated scopes actually granted.
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
    }
}

fn default_expires_in() -> i64 {
    3600
}

/// Error response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Posts form-encoded grants to a token URL.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    http: reqwest::Client,
    token_url: String,
}

impl TokenEndpoint {
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Send one grant request.
    ///
    /// `invalid_grant` maps to [`AuthError::InvalidGrant`]; other error
    /// bodies map to [`AuthError::TokenEndpoint`].
    pub async fn grant(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let grant_type = form
            .iter()
            .find(|(k, _)| *k == "grant_type")
            .map(|(_, v)| *v)
            .unwrap_or("unknown");
        debug!(token_url = %self.token_url, grant_type, "Requesting token");

        let response = self.http.post(&self.token_url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
                warn!(
                    error = %error.error,
                    description = ?error.error_description,
                    grant_type,
                    "Token request failed"
                );
                if error.error == "invalid_grant" {
                    return Err(AuthError::InvalidGrant);
                }
                return Err(AuthError::TokenEndpoint {
                    status: status.as_u16(),
                    message: error.error_description.unwrap_or(error.error),
                });
            }
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
