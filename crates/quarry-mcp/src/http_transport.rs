//! HTTP transport for MCP server.
//!
//! JSON-RPC messages are accepted as `POST /mcp` bodies and answered in
//! the response. Notifications get `202 Accepted` with no body.

use crate::error::McpError;
use crate::server::McpServer;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Create the HTTP router for MCP.
pub fn create_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp_post))
        .route("/health", get(handle_health))
        .with_state(server)
}

/// Handle POST requests to /mcp (JSON-RPC over HTTP).
async fn handle_mcp_post(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Handle health check requests.
async fn handle_health(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "quarry",
        "version": env!("CARGO_PKG_VERSION"),
        "tools": server.dispatcher().tools().names(),
    }))
}

/// HTTP server for MCP transport.
pub struct HttpServer {
    addr: String,
    server: Arc<McpServer>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server listening on `addr` (`host:port`).
    pub fn new(addr: impl Into<String>, server: Arc<McpServer>, cancel: CancellationToken) -> Self {
        Self {
            addr: addr.into(),
            server,
            cancel,
        }
    }

    /// Run the HTTP server until the cancellation token fires.
    pub async fn run(self) -> Result<(), McpError> {
        let app = create_router(self.server);

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| {
                McpError::StartupFailed(format!("Failed to bind to {}: {}", self.addr, e))
            })?;

        tracing::info!(addr = %self.addr, "MCP HTTP server listening");

        let cancel = self.cancel;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;

        tracing::info!("MCP HTTP server stopped");
        Ok(())
    }
}
