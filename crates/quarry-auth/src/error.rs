//! Error types for credential acquisition.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while acquiring, refreshing or storing credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential could be produced.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// The stored refresh token was rejected and an explicit re-login is needed.
    #[error("the saved OAuth refresh token is no longer valid, run reauth-oauth to sign in again")]
    ReauthRequired,

    /// The token endpoint rejected the grant (`invalid_grant`).
    #[error("refresh token is invalid or revoked")]
    InvalidGrant,

    /// The token endpoint returned some other error.
    #[error("token endpoint returned {status}: {message}")]
    TokenEndpoint { status: u16, message: String },

    /// The code exchange succeeded but no refresh token came back.
    #[error("token endpoint did not return a refresh token")]
    MissingRefreshToken,

    /// The user declined consent or the provider reported an error.
    #[error("authorization was denied: {0}")]
    AuthorizationDenied(String),

    /// The callback carried a state parameter we did not issue.
    #[error("authorization callback state did not match the request")]
    StateMismatch,

    /// The user did not finish authorizing in time.
    #[error("authorization timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Authorization was abandoned because the process is shutting down.
    #[error("authorization was cancelled")]
    Cancelled,

    /// The local callback listener could not be started or failed.
    #[error("callback listener error: {0}")]
    Callback(String),

    /// A service account or authorized-user key file is unusable.
    #[error("invalid credentials file {path}: {reason}")]
    InvalidKeyFile { path: PathBuf, reason: String },

    /// No ambient credentials could be located.
    #[error("no default credentials found: {0}")]
    NoDefaultCredentials(String),

    /// The OAuth client secrets are missing or malformed.
    #[error("invalid OAuth client secrets: {0}")]
    ClientSecrets(String),

    /// Signing a JWT assertion failed.
    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Configuration could not be turned into a credential source.
    #[error(transparent)]
    Config(#[from] quarry_core::ConfigError),

    /// Network error talking to a token or metadata endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The token file could not be written or removed.
    #[error("token store error: {0}")]
    Storage(String),

    /// Token file IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Whether the failure happened below HTTP (connection, timeout), as
    /// opposed to an answer from the server.
    pub fn is_transport(&self) -> bool {
        match self {
            AuthError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}
