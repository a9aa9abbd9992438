//! CLI command implementations for the Quarry MCP server.

pub mod auth;
pub mod check;
pub mod serve;
