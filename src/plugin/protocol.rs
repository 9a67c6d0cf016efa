//! Subprocess plugin protocol.
//!
//! The host writes one JSON object to the plugin's stdin and closes it:
//! `{"tool": ..., "input": ..., "context": {"pluginDir": ..., "dataDir": ...}}`.
//! The plugin writes one JSON object to stdout: `{"result": "...", "isError": false}`.
//! Timeouts, oversized output and non-zero exits become [`PluginError`]s; the
//! child is always killed on the way out.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

const MAX_STDERR_BYTES: usize = 64 * 1024;
const STDERR_IN_ERROR: usize = 500;

/// Hard bounds on one plugin call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for PluginLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PluginContext<'a> {
    plugin_dir: &'a Path,
    data_dir: &'a Path,
}

#[derive(Debug, Serialize)]
struct PluginRequest<'a> {
    tool: &'a str,
    input: &'a Value,
    context: PluginContext<'a>,
}

/// What the plugin printed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginResponse {
    pub result: String,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("Plugin failed to start: {0}")]
    Spawn(String),

    #[error("Plugin timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Plugin output exceeded {0} bytes")]
    OutputTooLarge(usize),

    #[error("Plugin exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    #[error("Plugin returned invalid output: {0}")]
    InvalidOutput(String),

    #[error("Plugin I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        PluginError::Io(e.to_string())
    }
}

/// Run one tool call against a plugin entrypoint.
pub async fn invoke_plugin(
    entrypoint: &Path,
    plugin_dir: &Path,
    data_dir: &Path,
    tool: &str,
    input: &Value,
    limits: &PluginLimits,
) -> Result<PluginResponse, PluginError> {
    std::fs::create_dir_all(data_dir)?;

    let request = PluginRequest {
        tool,
        input,
        context: PluginContext { plugin_dir, data_dir },
    };
    let mut payload = serde_json::to_vec(&request).map_err(|e| PluginError::Io(e.to_string()))?;
    payload.push(b'\n');

    let mut child = Command::new(entrypoint)
        .current_dir(plugin_dir)
        .env("PLUGIN_DIR", plugin_dir)
        .env("PLUGIN_DATA_DIR", data_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PluginError::Spawn(format!("{}: {}", entrypoint.display(), e)))?;

    let mut stdin = child.stdin.take().ok_or_else(|| PluginError::Io("stdin unavailable".into()))?;
    let stdout = child.stdout.take().ok_or_else(|| PluginError::Io("stdout unavailable".into()))?;
    let stderr = child.stderr.take().ok_or_else(|| PluginError::Io("stderr unavailable".into()))?;

    let stderr_task = tokio::spawn(async move { read_capped(stderr, MAX_STDERR_BYTES).await });

    let exchange = async {
        if let Err(e) = stdin.write_all(&payload).await {
            // The plugin may exit without reading its input
            log::debug!("Plugin {} closed stdin early: {}", tool, e);
        }
        drop(stdin);

        let (out, overflowed) = read_capped(stdout, limits.max_output_bytes).await?;
        if overflowed {
            return Err(PluginError::OutputTooLarge(limits.max_output_bytes));
        }
        let status = child.wait().await?;
        Ok::<_, PluginError>((status, out))
    };

    let outcome = tokio::time::timeout(limits.timeout, exchange).await;
    let (status, out) = match outcome {
        Ok(Ok(done)) => done,
        Ok(Err(e)) => {
            let _ = child.kill().await;
            stderr_task.abort();
            log::warn!("Plugin {} failed: {}", tool, e);
            return Err(e);
        }
        Err(_) => {
            let _ = child.kill().await;
            stderr_task.abort();
            log::warn!("Plugin {} timed out after {:?}", tool, limits.timeout);
            return Err(PluginError::Timeout(limits.timeout));
        }
    };

    let stderr_text = match stderr_task.await {
        Ok(Ok((bytes, _))) => String::from_utf8_lossy(&bytes).trim().to_string(),
        _ => String::new(),
    };

    if !status.success() {
        return Err(PluginError::NonZeroExit {
            status: status.to_string(),
            stderr: crate::domain::truncate(&stderr_text, STDERR_IN_ERROR),
        });
    }

    parse_response(&out)
}

/// Parse the single JSON object a plugin writes to stdout.
pub fn parse_response(stdout: &[u8]) -> Result<PluginResponse, PluginError> {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PluginError::InvalidOutput("empty output".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|e| PluginError::InvalidOutput(e.to_string()))
}

/// Read until EOF or until more than `max` bytes arrive.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, max: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok((buf, false));
        }
        if buf.len() + n > max {
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let resp = parse_response(br#"{"result":"sunny","isError":false}"#).unwrap();
        assert_eq!(resp.result, "sunny");
        assert!(!resp.is_error);

        let err = parse_response(b"  {\"result\":\"no city\",\"isError\":true}\n").unwrap();
        assert!(err.is_error);

        let default_flag = parse_response(br#"{"result":"ok"}"#).unwrap();
        assert!(!default_flag.is_error);
    }

    #[test]
    fn test_parse_response_rejects_garbage() {
        assert!(matches!(parse_response(b""), Err(PluginError::InvalidOutput(_))));
        assert!(matches!(parse_response(b"hello"), Err(PluginError::InvalidOutput(_))));
        assert!(matches!(
            parse_response(br#"{"result":"a"}{"result":"b"}"#),
            Err(PluginError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let input = serde_json::json!({"city": "Oslo"});
        let request = PluginRequest {
            tool: "weather_lookup",
            input: &input,
            context: PluginContext {
                plugin_dir: Path::new("/p"),
                data_dir: Path::new("/d"),
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["tool"], "weather_lookup");
        assert_eq!(value["input"]["city"], "Oslo");
        assert_eq!(value["context"]["pluginDir"], "/p");
        assert_eq!(value["context"]["dataDir"], "/d");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PluginError::Timeout(Duration::from_secs(30)).to_string(),
            "Plugin timed out after 30s"
        );
        assert_eq!(
            PluginError::OutputTooLarge(1048576).to_string(),
            "Plugin output exceeded 1048576 bytes"
        );
    }

    #[test]
    fn test_default_limits() {
        let limits = PluginLimits::default();
        assert_eq!(limits.timeout, Duration::from_secs(30));
        assert_eq!(limits.max_output_bytes, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_read_capped() {
        let data = vec![b'x'; 100];
        let (out, overflowed) = read_capped(&data[..], 1000).await.unwrap();
        assert_eq!(out.len(), 100);
        assert!(!overflowed);

        let (_, overflowed) = read_capped(&data[..], 50).await.unwrap();
        assert!(overflowed);
    }
}
