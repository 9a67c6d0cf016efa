//! Plugin discovery from `plugin_dir/*/plugin.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use super::manifest::{MANIFEST_FILE, PluginManifest};
use crate::error::Result;

/// A validated plugin ready to be invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPlugin {
    pub dir: PathBuf,
    /// Canonical entrypoint path inside `dir`
    pub entrypoint: PathBuf,
    pub manifest: PluginManifest,
}

impl LoadedPlugin {
    /// Load and validate the plugin in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = PluginManifest::from_file(dir.join(MANIFEST_FILE))?;
        let entrypoint = manifest.resolve_entrypoint(dir)?;
        Ok(Self {
            dir: dir.canonicalize()?,
            entrypoint,
            manifest,
        })
    }

    /// Per-plugin data directory under `data_root`.
    pub fn data_dir(&self, data_root: &Path) -> PathBuf {
        data_root.join(&self.manifest.name)
    }
}

/// Load every valid plugin under `plugin_dir`, skipping broken ones.
///
/// A missing `plugin_dir` yields no plugins.
pub fn discover_plugins(plugin_dir: &Path) -> Result<Vec<LoadedPlugin>> {
    if !plugin_dir.is_dir() {
        log::debug!("Plugin directory {} does not exist", plugin_dir.display());
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(plugin_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();

    let mut plugins = Vec::new();
    for dir in dirs {
        match LoadedPlugin::load(&dir) {
            Ok(plugin) => {
                log::info!(
                    "Loaded plugin {} {} ({} tools)",
                    plugin.manifest.name,
                    plugin.manifest.version,
                    plugin.manifest.tools.len()
                );
                plugins.push(plugin);
            }
            Err(e) => log::warn!("Skipping plugin in {}: {}", dir.display(), e),
        }
    }
    Ok(plugins)
}
