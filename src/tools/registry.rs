//! Name-to-handler lookup table
//!
//! Built-in tools map to an executor category; plugin tools map to their
//! plugin. The plugin half can be swapped at runtime without touching
//! in-flight dispatches.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::plugin::LoadedPlugin;

use super::catalog::ToolCatalog;
use super::definition::{ExecutorKind, ToolSpec};

/// Who handles a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerKind {
    Builtin(ExecutorKind),
    Plugin(Arc<LoadedPlugin>),
}

/// One resolved registry entry
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEntry {
    pub spec: ToolSpec,
    pub handler: HandlerKind,
}

#[derive(Debug, Default)]
struct Tables {
    builtins: BTreeMap<String, ToolEntry>,
    plugins: BTreeMap<String, ToolEntry>,
}

/// Thread-safe registry of every callable tool
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tables: RwLock<Tables>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every tool of `catalog`
    pub fn from_catalog(catalog: &ToolCatalog) -> Self {
        let registry = Self::new();
        for (spec, kind) in catalog.entries() {
            registry.register_builtin(spec.clone(), kind);
        }
        registry
    }

    pub fn register_builtin(&self, spec: ToolSpec, kind: ExecutorKind) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.builtins.insert(
            spec.name.clone(),
            ToolEntry {
                spec,
                handler: HandlerKind::Builtin(kind),
            },
        );
    }

    /// Replace every plugin tool in one swap.
    ///
    /// A plugin tool whose name clashes with a built-in or an earlier
    /// plugin is skipped. Returns the number of plugin tools registered.
    pub fn replace_plugins(&self, plugins: Vec<LoadedPlugin>) -> usize {
        let builtin_names: Vec<String> = {
            let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
            tables.builtins.keys().cloned().collect()
        };

        let mut next = BTreeMap::new();
        for plugin in plugins {
            let plugin = Arc::new(plugin);
            for spec in &plugin.manifest.tools {
                if builtin_names.contains(&spec.name) {
                    log::warn!(
                        "Plugin {} tool {} shadows a built-in tool; skipping",
                        plugin.manifest.name,
                        spec.name
                    );
                    continue;
                }
                if next.contains_key(&spec.name) {
                    log::warn!(
                        "Plugin {} tool {} is already provided by another plugin; skipping",
                        plugin.manifest.name,
                        spec.name
                    );
                    continue;
                }
                next.insert(
                    spec.name.clone(),
                    ToolEntry {
                        spec: spec.clone(),
                        handler: HandlerKind::Plugin(Arc::clone(&plugin)),
                    },
                );
            }
        }

        let count = next.len();
        self.tables.write().unwrap_or_else(|e| e.into_inner()).plugins = next;
        count
    }

    /// Look a tool up by name.
    pub fn resolve(&self, name: &str) -> Option<ToolEntry> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .builtins
            .get(name)
            .or_else(|| tables.plugins.get(name))
            .cloned()
    }

    /// Every tool spec, built-ins first, each group sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .builtins
            .values()
            .chain(tables.plugins.values())
            .map(|entry| entry.spec.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.specs().into_iter().map(|spec| spec.name).collect()
    }

    pub fn plugin_tool_count(&self) -> usize {
        self.tables.read().unwrap_or_else(|e| e.into_inner()).plugins.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginManifest;
    use std::path::PathBuf;

    fn plugin(name: &str, tools: &[&str]) -> LoadedPlugin {
        let mut toml = format!("name = \"{}\"\nentrypoint = \"run.sh\"\n", name);
        for tool in tools {
            toml.push_str(&format!("\n[[tool]]\nname = \"{}\"\ndescription = \"d\"\n", tool));
        }
        LoadedPlugin {
            dir: PathBuf::from("/plugins").join(name),
            entrypoint: PathBuf::from("/plugins").join(name).join("run.sh"),
            manifest: PluginManifest::from_toml(&toml).unwrap(),
        }
    }

    #[test]
    fn test_resolve_builtin() {
        let registry = ToolRegistry::from_catalog(&ToolCatalog::builtin().unwrap());
        let entry = registry.resolve("click").unwrap();
        assert_eq!(entry.handler, HandlerKind::Builtin(ExecutorKind::Input));
        assert!(registry.resolve("teleport").is_none());
    }

    #[test]
    fn test_replace_plugins_swaps_set() {
        let registry = ToolRegistry::from_catalog(&ToolCatalog::builtin().unwrap());
        assert_eq!(registry.replace_plugins(vec![plugin("weather", &["weather_lookup"])]), 1);
        assert!(matches!(
            registry.resolve("weather_lookup").unwrap().handler,
            HandlerKind::Plugin(_)
        ));

        registry.replace_plugins(vec![plugin("notes", &["note_search"])]);
        assert!(registry.resolve("weather_lookup").is_none());
        assert!(registry.resolve("note_search").is_some());
        assert_eq!(registry.plugin_tool_count(), 1);
    }

    #[test]
    fn test_plugin_cannot_shadow_builtin() {
        let registry = ToolRegistry::from_catalog(&ToolCatalog::builtin().unwrap());
        let count = registry.replace_plugins(vec![plugin("evil", &["run_shell", "harmless"])]);
        assert_eq!(count, 1);
        assert_eq!(
            registry.resolve("run_shell").unwrap().handler,
            HandlerKind::Builtin(ExecutorKind::Shell)
        );
    }

    #[test]
    fn test_duplicate_plugin_tool_first_wins() {
        let registry = ToolRegistry::new();
        registry.replace_plugins(vec![plugin("a", &["shared"]), plugin("b", &["shared"])]);
        let HandlerKind::Plugin(owner) = registry.resolve("shared").unwrap().handler else {
            panic!("expected plugin handler");
        };
        assert_eq!(owner.manifest.name, "a");
    }

    #[test]
    fn test_specs_order() {
        let registry = ToolRegistry::new();
        registry.register_builtin(ToolSpec::new("zoom", "z"), ExecutorKind::Input);
        registry.register_builtin(ToolSpec::new("click", "c"), ExecutorKind::Input);
        registry.replace_plugins(vec![plugin("p", &["alpha"])]);
        assert_eq!(registry.names(), vec!["click", "zoom", "alpha"]);
    }
}
