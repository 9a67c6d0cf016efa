//! Shell and script executor
//!
//! Serves `run_shell` through `bash -c` and `applescript` through `osascript -e`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::executor::{ActionExecutor, ExecuteOptions};
use super::result::ToolResult;

/// Runs commands with a timeout and bounded output
pub struct ShellExecutor {
    timeout: Duration,
    max_output_bytes: usize,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_output_bytes: 100_000,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set maximum output size in bytes
    pub fn with_max_output(mut self, max_bytes: usize) -> Self {
        self.max_output_bytes = max_bytes;
        self
    }

    async fn run(&self, program: &str, flag: &str, body: &str) -> ToolResult {
        let child = Command::new(program)
            .arg(flag)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return ToolResult::error(format!("Failed to spawn {}: {}", program, e)),
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("IO error: {}", e)),
            Err(_) => {
                return ToolResult::error(format!("Command timed out after {}ms", self.timeout.as_millis()));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }

        if text.len() > self.max_output_bytes {
            let mut cut = self.max_output_bytes;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n... [output truncated]");
        }

        if output.status.success() {
            if text.trim().is_empty() {
                text = "(no output)".to_string();
            }
            ToolResult::success(text)
        } else {
            ToolResult::error(format!("Exit status {}: {}", output.status, text.trim_end()))
        }
    }
}

#[async_trait]
impl ActionExecutor for ShellExecutor {
    async fn execute(&self, name: &str, params: &Value, _options: &ExecuteOptions) -> ToolResult {
        match name {
            "run_shell" | "shell" | "bash" | "run_command" => {
                let Some(command) = params["command"].as_str() else {
                    return ToolResult::error("Missing 'command' parameter");
                };
                log::debug!("run_shell: {}", command);
                self.run("bash", "-c", command).await
            }
            "applescript" => {
                let Some(script) = params["script"].as_str() else {
                    return ToolResult::error("Missing 'script' parameter");
                };
                self.run("osascript", "-e", script).await
            }
            other => ToolResult::error(format!("Tool '{}' is not served by the shell executor", other)),
        }
    }
}
