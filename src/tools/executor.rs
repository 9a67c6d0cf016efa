//! First-party executor seam.

use async_trait::async_trait;
use serde_json::Value;

use super::result::ToolResult;

/// Per-call options passed to an executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Events generated by this call must not trigger the global hotkey
    pub synthetic_input: bool,
    pub target_pid: Option<u32>,
}

/// One executor serves every built-in tool of its category.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, name: &str, params: &Value, options: &ExecuteOptions) -> ToolResult;
}
