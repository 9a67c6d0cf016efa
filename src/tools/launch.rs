//! Application and URL launcher.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::executor::{ActionExecutor, ExecuteOptions};
use super::result::ToolResult;

/// Serves `open_application` and `open_url` through the platform opener.
#[derive(Debug, Clone, Default)]
pub struct LaunchExecutor;

impl LaunchExecutor {
    fn command(name: &str, params: &Value) -> Result<Command, String> {
        match name {
            "open_application" => {
                let app = params["name"].as_str().ok_or("Missing 'name' parameter")?;
                let mut cmd = if cfg!(target_os = "macos") {
                    let mut cmd = Command::new("open");
                    cmd.arg("-a");
                    cmd
                } else {
                    Command::new("gtk-launch")
                };
                cmd.arg(app);
                Ok(cmd)
            }
            "open_url" => {
                let url = params["url"].as_str().ok_or("Missing 'url' parameter")?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(format!("Refusing to open non-http URL: {}", url));
                }
                let mut cmd = Command::new(if cfg!(target_os = "macos") { "open" } else { "xdg-open" });
                cmd.arg(url);
                Ok(cmd)
            }
            other => Err(format!("Tool '{}' is not served by the launch executor", other)),
        }
    }
}

#[async_trait]
impl ActionExecutor for LaunchExecutor {
    async fn execute(&self, name: &str, params: &Value, _options: &ExecuteOptions) -> ToolResult {
        let mut cmd = match Self::command(name, params) {
            Ok(cmd) => cmd,
            Err(e) => return ToolResult::error(e),
        };
        match cmd.output().await {
            Ok(output) if output.status.success() => ToolResult::success(format!("{} succeeded", name)),
            Ok(output) => ToolResult::error(format!(
                "{} failed: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(e) => ToolResult::error(format!("{} failed to start: {}", name, e)),
        }
    }
}
