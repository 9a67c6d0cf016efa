//! Out-of-process plugins
//!
//! - Manifest: name, version, entrypoint, permissions, tools
//! - Loader: discovery under the plugin directory
//! - Protocol: one JSON request on stdin, one JSON response on stdout

mod loader;
mod manifest;
mod protocol;

pub use loader::{LoadedPlugin, discover_plugins};
pub use manifest::{MANIFEST_FILE, PluginManifest};
pub use protocol::{PluginError, PluginLimits, PluginResponse, invoke_plugin, parse_response};
