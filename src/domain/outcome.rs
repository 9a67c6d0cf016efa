//! Run outcome types.
//!
//! This module defines how a run ends and what the caller receives.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm::Usage;

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model reported the goal done
    Completed(String),
    /// Budget exhaustion or cancellation
    Failed(String),
}

impl RunOutcome {
    pub fn reason(&self) -> &str {
        match self {
            RunOutcome::Completed(reason) | RunOutcome::Failed(reason) => reason,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Lifecycle phase reported through the state-change callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Starting,
    Observing,
    Thinking,
    Acting,
    AwaitingConfirmation,
    Completed,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Starting => "starting",
            RunPhase::Observing => "observing",
            RunPhase::Thinking => "thinking",
            RunPhase::Acting => "acting",
            RunPhase::AwaitingConfirmation => "awaiting confirmation",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the caller receives when a run ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub success: bool,
    /// Human-readable sentence describing the outcome
    pub summary: String,
    pub iterations: u32,
    pub tokens: Usage,
}

impl RunResult {
    pub fn succeeded(run_id: impl Into<String>, summary: impl Into<String>, iterations: u32, tokens: Usage) -> Self {
        Self {
            run_id: run_id.into(),
            success: true,
            summary: summary.into(),
            iterations,
            tokens,
        }
    }

    pub fn failed(run_id: impl Into<String>, summary: impl Into<String>, iterations: u32, tokens: Usage) -> Self {
        Self {
            run_id: run_id.into(),
            success: false,
            summary: summary.into(),
            iterations,
            tokens,
        }
    }
}

/// Turn a terse reason into a complete sentence.
pub fn as_sentence(reason: &str) -> String {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return "The run ended without a reason.".to_string();
    }
    let mut chars = trimmed.chars();
    let mut out: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}
