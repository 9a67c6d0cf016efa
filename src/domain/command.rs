//! Commands submitted to the orchestrator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::outcome::RunResult;

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Hotkey,
    Voice,
    Cli,
    Messaging,
    /// Resumed from an incomplete journal
    Recovery,
}

impl CommandSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandSource::Hotkey => "hotkey",
            CommandSource::Voice => "voice",
            CommandSource::Cli => "cli",
            CommandSource::Messaging => "messaging",
            CommandSource::Recovery => "recovery",
        }
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hotkey" => Ok(CommandSource::Hotkey),
            "voice" => Ok(CommandSource::Voice),
            "cli" => Ok(CommandSource::Cli),
            "messaging" => Ok(CommandSource::Messaging),
            "recovery" => Ok(CommandSource::Recovery),
            other => Err(format!("unknown command source: {}", other)),
        }
    }
}

/// A natural-language goal to run once.
#[derive(Debug)]
pub struct Command {
    pub text: String,
    pub source: CommandSource,
    /// Process whose window the run should focus on
    pub target_pid: Option<u32>,
    /// Receives the final result when the run ends
    pub reply: Option<oneshot::Sender<RunResult>>,
}

impl Command {
    pub fn new(text: impl Into<String>, source: CommandSource) -> Self {
        Self {
            text: text.into(),
            source,
            target_pid: None,
            reply: None,
        }
    }

    pub fn with_target(mut self, pid: u32) -> Self {
        self.target_pid = Some(pid);
        self
    }

    /// Attach a reply channel and return the receiving end.
    pub fn with_reply(mut self) -> (Self, oneshot::Receiver<RunResult>) {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        (self, rx)
    }
}
