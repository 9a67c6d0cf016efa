//! Tool catalog loading from TOML
//!
//! Built-in tools ship as an embedded TOML catalog; plugin manifests use the
//! same `[[tool]]` table layout.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DeskloopError, Result};

use super::definition::{ExecutorKind, ToolSpec};

const BUILTIN_CATALOG: &str = r#"
[[tool]]
name = "click"
description = "Click at a screen point"
executor = "input"
required = ["x", "y"]
[tool.params.x]
type = "integer"
[tool.params.y]
type = "integer"
[tool.params.button]
type = "string"
description = "left, right or middle"

[[tool]]
name = "double_click"
description = "Double-click at a screen point"
executor = "input"
required = ["x", "y"]
[tool.params.x]
type = "integer"
[tool.params.y]
type = "integer"

[[tool]]
name = "drag"
description = "Drag from one point to another"
executor = "input"
required = ["start_x", "start_y", "end_x", "end_y"]
[tool.params.start_x]
type = "integer"
[tool.params.start_y]
type = "integer"
[tool.params.end_x]
type = "integer"
[tool.params.end_y]
type = "integer"

[[tool]]
name = "scroll"
description = "Scroll at a point; positive amount scrolls down"
executor = "input"
required = ["amount"]
[tool.params.amount]
type = "integer"
[tool.params.x]
type = "integer"
[tool.params.y]
type = "integer"

[[tool]]
name = "type_text"
description = "Type text into the focused field"
executor = "input"
required = ["text"]
[tool.params.text]
type = "string"

[[tool]]
name = "key"
description = "Press a key or combination such as cmd+space"
executor = "input"
required = ["combo"]
[tool.params.combo]
type = "string"

[[tool]]
name = "open_application"
description = "Launch or focus an application by name"
executor = "launch"
required = ["name"]
[tool.params.name]
type = "string"

[[tool]]
name = "open_url"
description = "Open a URL in the default browser"
executor = "launch"
required = ["url"]
[tool.params.url]
type = "string"

[[tool]]
name = "run_shell"
description = "Run a shell command and return its output"
executor = "shell"
required = ["command"]
[tool.params.command]
type = "string"

[[tool]]
name = "applescript"
description = "Run an AppleScript snippet"
executor = "shell"
required = ["script"]
[tool.params.script]
type = "string"

[[tool]]
name = "vault_read"
description = "Read a note from the vault"
executor = "vault"
required = ["path"]
[tool.params.path]
type = "string"

[[tool]]
name = "vault_write"
description = "Write a note to the vault"
executor = "vault"
required = ["path", "content"]
[tool.params.path]
type = "string"
[tool.params.content]
type = "string"
"#;

/// TOML representation of a tool parameter
#[derive(Debug, Deserialize)]
pub(crate) struct TomlParam {
    #[serde(rename = "type")]
    param_type: String,
    description: Option<String>,
}

/// TOML representation of a tool definition
#[derive(Debug, Deserialize)]
pub(crate) struct TomlTool {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) executor: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, TomlParam>,
    #[serde(default)]
    required: Vec<String>,
}

impl TomlTool {
    /// Build the JSON schema and tool spec
    pub(crate) fn to_spec(&self) -> ToolSpec {
        let mut properties = serde_json::Map::new();
        for (name, param) in &self.params {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), Value::String(param.param_type.clone()));
            if let Some(desc) = &param.description {
                prop.insert("description".to_string(), Value::String(desc.clone()));
            }
            properties.insert(name.clone(), Value::Object(prop));
        }

        let schema = serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required
        });

        ToolSpec::new(self.name.clone(), self.description.clone()).with_schema(schema)
    }
}

/// TOML file structure
#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(rename = "tool")]
    tools: Vec<TomlTool>,
}

/// Catalog of built-in tools and the executor serving each
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: HashMap<String, (ToolSpec, ExecutorKind)>,
}

impl ToolCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// The catalog of first-party tools
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    /// Load catalog from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let catalog: TomlCatalog =
            toml::from_str(content).map_err(|e| DeskloopError::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut tools = HashMap::new();
        for toml_tool in catalog.tools {
            let executor = toml_tool
                .executor
                .as_deref()
                .and_then(ExecutorKind::parse)
                .ok_or_else(|| {
                    DeskloopError::Config(format!(
                        "Invalid executor '{}' for tool '{}'",
                        toml_tool.executor.clone().unwrap_or_default(),
                        toml_tool.name
                    ))
                })?;
            tools.insert(toml_tool.name.clone(), (toml_tool.to_spec(), executor));
        }

        Ok(Self { tools })
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|(spec, _)| spec)
    }

    /// Get the executor for a tool
    pub fn executor_for(&self, name: &str) -> Option<ExecutorKind> {
        self.tools.get(name).map(|(_, kind)| *kind)
    }

    /// All tools with their executors
    pub fn entries(&self) -> impl Iterator<Item = (&ToolSpec, ExecutorKind)> {
        self.tools.values().map(|(spec, kind)| (spec, *kind))
    }

    /// Add a tool to the catalog
    pub fn add(&mut self, spec: ToolSpec, executor: ExecutorKind) {
        self.tools.insert(spec.name.clone(), (spec, executor));
    }

    /// Get number of tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if catalog is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}
