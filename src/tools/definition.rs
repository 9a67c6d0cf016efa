//! Tool definitions and executor categories
//!
//! A tool is a named action the model may propose. Built-in tools are served
//! by an executor category; plugin tools by their plugin process.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ToolDefinition;

/// Category of first-party executor serving a built-in tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Synthetic mouse and keyboard input
    Input,
    /// Launching applications and URLs
    Launch,
    /// Shell commands and scripts
    Shell,
    /// Note vault reads and writes
    Vault,
}

impl ExecutorKind {
    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "input" => Some(Self::Input),
            "launch" => Some(Self::Launch),
            "shell" | "script" => Some(Self::Shell),
            "vault" => Some(Self::Vault),
            _ => None,
        }
    }

    /// Whether this executor generates synthetic key or mouse events
    pub fn injects_input(&self) -> bool {
        matches!(self, Self::Input)
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Launch => "launch",
            Self::Shell => "shell",
            Self::Vault => "vault",
        };
        f.write_str(s)
    }
}

/// A tool the model can name in its action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name (e.g., "click", "run_shell")
    pub name: String,
    /// Human-readable description for the model
    pub description: String,
    /// JSON schema for input parameters
    pub input_schema: Value,
}

impl ToolSpec {
    /// Create a new tool definition with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Set input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Parameter names declared by the schema, required ones first
    pub fn param_names(&self) -> Vec<String> {
        let required: Vec<String> = self.input_schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let mut names = required.clone();
        if let Some(props) = self.input_schema["properties"].as_object() {
            let mut optional: Vec<String> = props.keys().filter(|k| !required.contains(k)).cloned().collect();
            optional.sort();
            names.extend(optional);
        }
        names
    }

    /// One line for the system prompt's tool list
    pub fn prompt_line(&self) -> String {
        let params = self.param_names();
        if params.is_empty() {
            format!("- {}: {}", self.name, self.description)
        } else {
            format!("- {}({}): {}", self.name, params.join(", "), self.description)
        }
    }

    /// Convert to LLM ToolDefinition for API calls
    pub fn to_llm_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name.clone(), self.description.clone(), self.input_schema.clone())
    }
}
