//! Error types for warehouse operations.

use quarry_auth::AuthError;
use std::time::Duration;
use thiserror::Error;

/// Errors from the BigQuery adapter and the scoped client.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// No usable credential.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// BigQuery rejected the access token (HTTP 401).
    #[error("credential rejected by BigQuery: {0}")]
    Unauthorized(String),

    /// Access denied by BigQuery (HTTP 403) or by the dataset allow-list.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Dataset or table does not exist, or is outside the allow-list.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other error response from the API.
    #[error("BigQuery API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The query job did not finish in time.
    #[error("query did not complete within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Network failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response could not be decoded.
    #[error("unexpected response from BigQuery: {0}")]
    Decode(String),
}
