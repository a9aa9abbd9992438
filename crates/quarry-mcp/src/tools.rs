//! Tool names, definitions and the registry of enabled tools.

use crate::protocol::{ToolAnnotations, ToolDefinition};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

/// Tools the dispatcher knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ExecuteQuery,
    ListTables,
    DescribeTable,
    ReauthOAuth,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::ExecuteQuery,
        ToolName::ListTables,
        ToolName::DescribeTable,
        ToolName::ReauthOAuth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ExecuteQuery => "execute-query",
            ToolName::ListTables => "list-tables",
            ToolName::DescribeTable => "describe-table",
            ToolName::ReauthOAuth => "reauth-oauth",
        }
    }

    /// Protocol definition advertised by `tools/list`.
    pub fn definition(&self) -> ToolDefinition {
        match self {
            ToolName::ExecuteQuery => ToolDefinition {
                name: self.as_str().to_string(),
                description: Some(
                    "Run a read-only BigQuery SQL query and return the rows. \
                     Use @name placeholders with `params` for literal values."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "sql": {
                            "type": "string",
                            "description": "GoogleSQL query text"
                        },
                        "params": {
                            "type": "object",
                            "description": "Named query parameters (string, number or boolean values)",
                            "additionalProperties": {
                                "type": ["string", "number", "boolean", "null"]
                            }
                        },
                        "dry_run": {
                            "type": "boolean",
                            "description": "Validate and estimate bytes processed without running the query"
                        }
                    },
                    "required": ["sql"]
                }),
                annotations: Some(ToolAnnotations {
                    title: Some("Execute query".to_string()),
                    read_only_hint: Some(true),
                    idempotent_hint: None,
                    open_world_hint: Some(false),
                }),
            },
            ToolName::ListTables => ToolDefinition {
                name: self.as_str().to_string(),
                description: Some(
                    "List every table in the datasets this server may access.".to_string(),
                ),
                input_schema: json!({ "type": "object", "properties": {} }),
                annotations: Some(ToolAnnotations {
                    title: Some("List tables".to_string()),
                    read_only_hint: Some(true),
                    idempotent_hint: Some(true),
                    open_world_hint: Some(false),
                }),
            },
            ToolName::DescribeTable => ToolDefinition {
                name: self.as_str().to_string(),
                description: Some(
                    "Show the column schema of a table. Pass `dataset` and `table`, \
                     or `table_name` as dataset.table or project.dataset.table."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "dataset": { "type": "string", "description": "Dataset id" },
                        "table": { "type": "string", "description": "Table id" },
                        "table_name": {
                            "type": "string",
                            "description": "Qualified table name"
                        }
                    }
                }),
                annotations: Some(ToolAnnotations {
                    title: Some("Describe table".to_string()),
                    read_only_hint: Some(true),
                    idempotent_hint: Some(true),
                    open_world_hint: Some(false),
                }),
            },
            ToolName::ReauthOAuth => ToolDefinition {
                name: self.as_str().to_string(),
                description: Some(
                    "Discard the saved OAuth token and sign in again in the browser.".to_string(),
                ),
                input_schema: json!({ "type": "object", "properties": {} }),
                annotations: Some(ToolAnnotations {
                    title: Some("Re-authenticate".to_string()),
                    read_only_hint: Some(false),
                    idempotent_hint: Some(false),
                    open_world_hint: Some(true),
                }),
            },
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| format!("unknown tool: {}", s))
    }
}

/// Tools enabled for this deployment, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolName>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard tool set. `reauth-oauth` only exists when OAuth is active.
    pub fn standard(oauth: bool) -> Self {
        let mut registry = Self::new();
        registry.register(ToolName::ExecuteQuery);
        registry.register(ToolName::ListTables);
        registry.register(ToolName::DescribeTable);
        if oauth {
            registry.register(ToolName::ReauthOAuth);
        }
        registry
    }

    /// Register a tool. Registering twice has no effect.
    pub fn register(&mut self, tool: ToolName) {
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
    }

    /// Resolve an enabled tool by name.
    pub fn get(&self, name: &str) -> Option<ToolName> {
        let tool = name.parse::<ToolName>().ok()?;
        self.contains(tool).then_some(tool)
    }

    pub fn contains(&self, tool: ToolName) -> bool {
        self.tools.contains(&tool)
    }

    /// Definitions of every enabled tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolName::definition).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(ToolName::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
