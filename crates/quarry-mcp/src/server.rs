//! MCP server implementation.
//!
//! This module provides the JSON-RPC method handling shared by both
//! transports, and the line-delimited stdio transport.

use crate::dispatcher::ToolDispatcher;
use crate::error::McpError;
use crate::http_transport::HttpServer;
use crate::protocol::*;
use quarry_core::{McpConfig, Transport};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The MCP server.
pub struct McpServer {
    config: McpConfig,
    dispatcher: ToolDispatcher,
    cancel: CancellationToken,
}

impl McpServer {
    /// Create a server. Cancelling `cancel` stops whichever transport runs.
    pub fn new(config: McpConfig, dispatcher: ToolDispatcher, cancel: CancellationToken) -> Self {
        Self {
            config,
            dispatcher,
            cancel,
        }
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Serve on the configured transport until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<(), McpError> {
        match self.config.transport {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http => {
                let cancel = self.cancel.clone();
                let addr = self.config.bind_addr();
                HttpServer::new(addr, self, cancel).run().await
            }
        }
    }

    /// Run the server with stdio transport.
    pub async fn run_stdio(self: Arc<Self>) -> Result<(), McpError> {
        info!(
            tools = ?self.dispatcher.tools().names(),
            "Starting MCP server with stdio transport"
        );
        self.serve_io(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve line-delimited JSON-RPC from `reader` to `writer`.
    ///
    /// Requests are handled concurrently; a single writer task keeps
    /// responses from interleaving. Returns at end of input, after every
    /// in-flight request has answered, or on cancellation.
    pub async fn serve_io<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>(64);
        let writer_task = tokio::spawn(write_lines(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        let mut handlers = JoinSet::new();

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested, closing stdio transport");
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("stdin closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let server = self.clone();
            let tx = tx.clone();
            handlers.spawn(async move {
                let Some(response) = server.handle_message(&line).await else {
                    return;
                };
                match serde_json::to_string(&response) {
                    Ok(json) => {
                        if tx.send(json).await.is_err() {
                            warn!("Response writer closed, dropping response");
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to serialize response"),
                }
            });
            while handlers.try_join_next().is_some() {}
        }

        let drained = tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = drain(&mut handlers) => true,
        };
        if !drained {
            handlers.abort_all();
        }
        drop(handlers);
        drop(tx);

        writer_task
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?
    }

    /// Handle one raw JSON-RPC message. Returns `None` for notifications.
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Received malformed JSON");
                return Some(JsonRpcResponse::error(
                    None,
                    codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                format!("Invalid request: {}", e),
            )),
        }
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "Received notification");
            return None;
        }

        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "shutdown" => self.handle_shutdown(id),
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let protocol_version = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION)
            .to_string();

        let result = InitializeResult {
            protocol_version,
            server_info: ServerInfo {
                name: "quarry".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: json!({
                "tools": {
                    "listChanged": false
                }
            }),
        };
        respond(id, &result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = ListToolsResult {
            tools: self.dispatcher.tools().definitions(),
        };
        respond(id, &result)
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        codes::INVALID_PARAMS,
                        format!("Invalid params: {}", e),
                    );
                }
            },
            None => return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "Missing params"),
        };

        let result = match self.dispatcher.dispatch(&params.name, params.arguments).await {
            Ok(payload) => CallToolResult::payload(payload),
            Err(e) => CallToolResult::failure(e.to_string(), e.to_json()),
        };
        respond(id, &result)
    }

    fn handle_shutdown(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("MCP server shutdown requested");
        JsonRpcResponse::success(id, Value::Null)
    }
}

fn respond<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
    }
}

async fn drain(handlers: &mut JoinSet<()>) {
    while handlers.join_next().await.is_some() {}
}

async fn write_lines<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
