//! Error types for the MCP crate.

use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

use quarry_auth::AuthError;
use quarry_scope::ScopeError;
use quarry_warehouse::WarehouseError;

/// Errors that stop the MCP server itself.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Transport error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Stable error category reported to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No, invalid or expired credential; authorization denied or timed out.
    Auth,
    /// Dataset outside the allow-list, or access denied by BigQuery.
    Permission,
    /// Dataset or table does not exist.
    NotFound,
    /// Malformed tool arguments.
    Validation,
    /// Unknown or disabled tool.
    UnsupportedTool,
    /// Network or service failure.
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::UnsupportedTool => "unsupported_tool",
            ErrorKind::Transport => "transport",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed tool call, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unsupported_tool(name: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedTool,
            format!("tool '{}' is not available", name),
        )
    }

    /// `{kind, message}` body for structured tool output.
    pub fn to_json(&self) -> Value {
        json!({ "kind": self.kind, "message": self.message })
    }
}

impl From<AuthError> for ToolError {
    fn from(err: AuthError) -> Self {
        Self::new(ErrorKind::Auth, err.to_string())
    }
}

impl From<ScopeError> for ToolError {
    fn from(err: ScopeError) -> Self {
        Self::new(ErrorKind::Permission, err.to_string())
    }
}

impl From<WarehouseError> for ToolError {
    fn from(err: WarehouseError) -> Self {
        let kind = match &err {
            WarehouseError::Auth(_) | WarehouseError::Unauthorized(_) => ErrorKind::Auth,
            WarehouseError::PermissionDenied(_) => ErrorKind::Permission,
            WarehouseError::NotFound(_) => ErrorKind::NotFound,
            // Invalid query text or parameters rejected by BigQuery.
            WarehouseError::Api { status: 400, .. } => ErrorKind::Validation,
            WarehouseError::Api { .. }
            | WarehouseError::Timeout(_)
            | WarehouseError::Transport(_)
            | WarehouseError::Decode(_) => ErrorKind::Transport,
        };
        Self::new(kind, err.to_string())
    }
}
