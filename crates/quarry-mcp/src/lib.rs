//! # quarry-mcp
//!
//! MCP (Model Context Protocol) server exposing BigQuery to AI agents.
//!
//! ## Tools
//!
//! | Tool | Arguments | Available |
//! |------|-----------|-----------|
//! | `execute-query` | `sql`, optional `params`, `dry_run` | always |
//! | `list-tables` | none | always |
//! | `describe-table` | `dataset` + `table`, or `table_name` | always |
//! | `reauth-oauth` | none | OAuth deployments only |
//!
//! ## Request flow
//!
//! ```text
//! AI agent
//!    │  JSON-RPC (stdio lines or POST /mcp)
//!    ▼
//! McpServer ── tools/call ──► ToolDispatcher
//!                               1. validate arguments
//!                               2. check dataset scope
//!                               3. acquire credential   ← quarry-auth
//!                               4. call BigQuery        ← quarry-warehouse
//!                               5. map errors to {kind, message}
//! ```
//!
//! Tool failures are returned as `isError: true` results, never as
//! JSON-RPC errors, so the agent can read and react to them.

pub mod arguments;
pub mod dispatcher;
pub mod error;
pub mod http_transport;
pub mod protocol;
pub mod server;
pub mod tools;

pub use dispatcher::ToolDispatcher;
pub use error::{ErrorKind, McpError, ToolError};
pub use http_transport::{HttpServer, create_router};
pub use protocol::{
    CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse, ToolAnnotations,
    ToolContent, ToolDefinition,
};
pub use server::McpServer;
pub use tools::{ToolName, ToolRegistry};
