//! Plugin manifests (`plugin.toml`).
//!
//! ```toml
//! name = "weather"
//! version = "0.1.0"
//! entrypoint = "run.sh"
//! permissions = ["network"]
//!
//! [[tool]]
//! name = "weather_lookup"
//! description = "Current weather for a city"
//! required = ["city"]
//! [tool.params.city]
//! type = "string"
//! ```

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::domain::RiskTier;
use crate::error::{DeskloopError, Result};
use crate::safety::permissions_tier;
use crate::tools::ToolSpec;
use crate::tools::catalog::TomlTool;

pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, Deserialize)]
struct TomlManifest {
    name: String,
    #[serde(default)]
    version: Option<String>,
    entrypoint: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default, rename = "tool")]
    tools: Vec<TomlTool>,
}

/// Declared identity, entrypoint, permissions and tools of one plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    /// Path relative to the plugin directory
    pub entrypoint: String,
    pub description: Option<String>,
    /// Advisory permission strings
    pub permissions: Vec<String>,
    pub tools: Vec<ToolSpec>,
}

impl PluginManifest {
    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: TomlManifest = toml::from_str(content)
            .map_err(|e| DeskloopError::Plugin(format!("Failed to parse {}: {}", MANIFEST_FILE, e)))?;

        let manifest = Self {
            name: raw.name.trim().to_string(),
            version: raw.version.unwrap_or_else(|| "0.0.0".to_string()),
            entrypoint: raw.entrypoint,
            description: raw.description,
            permissions: raw.permissions,
            tools: raw.tools.iter().map(TomlTool::to_spec).collect(),
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DeskloopError::Plugin(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DeskloopError::Plugin("Plugin name is empty".to_string()));
        }
        let mut components = Path::new(&self.name).components();
        let single = matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none();
        if !single || self.name.contains(['/', '\\']) {
            return Err(DeskloopError::Plugin(format!(
                "Plugin name {:?} must be a single path component",
                self.name
            )));
        }
        if self.tools.is_empty() {
            return Err(DeskloopError::Plugin(format!("Plugin {} declares no tools", self.name)));
        }
        if let Some(tool) = self.tools.iter().find(|t| t.name.trim().is_empty()) {
            return Err(DeskloopError::Plugin(format!(
                "Plugin {} has a tool with an empty name ({})",
                self.name, tool.description
            )));
        }
        let entry = Path::new(&self.entrypoint);
        let escapes = entry
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if self.entrypoint.trim().is_empty() || escapes {
            return Err(DeskloopError::Plugin(format!(
                "Plugin {} entrypoint {:?} must be a relative path inside the plugin directory",
                self.name, self.entrypoint
            )));
        }
        Ok(())
    }

    /// Resolve the entrypoint inside `plugin_dir`, rejecting symlink escapes.
    pub fn resolve_entrypoint(&self, plugin_dir: &Path) -> Result<PathBuf> {
        let dir = plugin_dir.canonicalize()?;
        let entry = dir.join(&self.entrypoint).canonicalize().map_err(|e| {
            DeskloopError::Plugin(format!("Plugin {} entrypoint {}: {}", self.name, self.entrypoint, e))
        })?;
        if !entry.starts_with(&dir) {
            return Err(DeskloopError::Plugin(format!(
                "Plugin {} entrypoint resolves outside its directory",
                self.name
            )));
        }
        Ok(entry)
    }

    /// Tier implied by the declared permissions.
    pub fn risk_tier(&self) -> RiskTier {
        permissions_tier(&self.permissions)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}
