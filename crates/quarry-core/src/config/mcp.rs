//! Where the server listens for JSON-RPC traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Listener settings. `host` and `port` only matter for [`Transport::Http`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpConfig {
    #[serde(default)]
    pub transport: Transport,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// `stdio` reads newline-delimited requests from stdin; `http` serves
/// `POST /mcp`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "http",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            other => Err(format!("unknown transport '{other}', expected stdio or http")),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: default_host(),
            port: default_port(),
        }
    }
}

impl McpConfig {
    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_http(&self) -> bool {
        self.transport == Transport::Http
    }

    /// The HTTP listener needs a host and a fixed port; stdio ignores both.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_http() {
            return Ok(());
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("mcp.host"));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "mcp.port",
                reason: "the http transport needs a fixed port".to_string(),
            });
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}
