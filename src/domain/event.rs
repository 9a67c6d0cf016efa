//! Journal event types.
//!
//! The event sequence for a run is the sole source of truth for its history.
//! Each variant is one JSONL line tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::command::CommandSource;
use super::risk::RiskTier;
use crate::id::now_ms;
use crate::llm::Usage;

/// One appended journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEvent {
    Created {
        run_id: String,
        command: String,
        source: CommandSource,
        target_pid: Option<u32>,
        ts: u64,
    },
    IterationStart {
        iteration: u32,
        /// Saved observation file, relative to the run directory
        observation: Option<String>,
        ts: u64,
    },
    ToolExecuted {
        iteration: u32,
        tool: String,
        params: Value,
        result: String,
        is_error: bool,
        risk_tier: Option<RiskTier>,
        ts: u64,
    },
    IterationEnd {
        iteration: u32,
        note: Option<String>,
        score: Option<f64>,
        /// Cumulative usage for the run so far
        #[serde(default)]
        input_tokens: u64,
        #[serde(default)]
        output_tokens: u64,
        ts: u64,
    },
    Complete {
        reason: String,
        iterations: u32,
        input_tokens: u64,
        output_tokens: u64,
        ts: u64,
    },
    Fail {
        reason: String,
        iterations: u32,
        input_tokens: u64,
        output_tokens: u64,
        ts: u64,
    },
    Stuck {
        iteration: u32,
        fingerprint: String,
        ts: u64,
    },
    Abandoned {
        reason: String,
        ts: u64,
    },
}

/// Longest tool result kept in the journal.
pub const MAX_JOURNALED_RESULT: usize = 500;

impl JournalEvent {
    pub fn created(run_id: &str, command: &str, source: CommandSource, target_pid: Option<u32>) -> Self {
        JournalEvent::Created {
            run_id: run_id.to_string(),
            command: command.to_string(),
            source,
            target_pid,
            ts: now_ms(),
        }
    }

    pub fn iteration_start(iteration: u32, observation: Option<String>) -> Self {
        JournalEvent::IterationStart {
            iteration,
            observation,
            ts: now_ms(),
        }
    }

    pub fn tool_executed(
        iteration: u32,
        tool: &str,
        params: &Value,
        result: &str,
        is_error: bool,
        risk_tier: Option<RiskTier>,
    ) -> Self {
        JournalEvent::ToolExecuted {
            iteration,
            tool: tool.to_string(),
            params: params.clone(),
            result: super::truncate(result, MAX_JOURNALED_RESULT),
            is_error,
            risk_tier,
            ts: now_ms(),
        }
    }

    pub fn iteration_end(iteration: u32, note: Option<String>, score: Option<f64>, tokens: Usage) -> Self {
        JournalEvent::IterationEnd {
            iteration,
            note,
            score,
            input_tokens: tokens.input_tokens,
            output_tokens: tokens.output_tokens,
            ts: now_ms(),
        }
    }

    pub fn complete(reason: &str, iterations: u32, tokens: Usage) -> Self {
        JournalEvent::Complete {
            reason: reason.to_string(),
            iterations,
            input_tokens: tokens.input_tokens,
            output_tokens: tokens.output_tokens,
            ts: now_ms(),
        }
    }

    pub fn fail(reason: &str, iterations: u32, tokens: Usage) -> Self {
        JournalEvent::Fail {
            reason: reason.to_string(),
            iterations,
            input_tokens: tokens.input_tokens,
            output_tokens: tokens.output_tokens,
            ts: now_ms(),
        }
    }

    pub fn stuck(iteration: u32, fingerprint: &str) -> Self {
        JournalEvent::Stuck {
            iteration,
            fingerprint: fingerprint.to_string(),
            ts: now_ms(),
        }
    }

    pub fn abandoned(reason: &str) -> Self {
        JournalEvent::Abandoned {
            reason: reason.to_string(),
            ts: now_ms(),
        }
    }

    /// Complete, fail and abandoned end a run's history.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JournalEvent::Complete { .. } | JournalEvent::Fail { .. } | JournalEvent::Abandoned { .. }
        )
    }

    /// The serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            JournalEvent::Created { .. } => "created",
            JournalEvent::IterationStart { .. } => "iteration_start",
            JournalEvent::ToolExecuted { .. } => "tool_executed",
            JournalEvent::IterationEnd { .. } => "iteration_end",
            JournalEvent::Complete { .. } => "complete",
            JournalEvent::Fail { .. } => "fail",
            JournalEvent::Stuck { .. } => "stuck",
            JournalEvent::Abandoned { .. } => "abandoned",
        }
    }

    pub fn ts(&self) -> u64 {
        match self {
            JournalEvent::Created { ts, .. }
            | JournalEvent::IterationStart { ts, .. }
            | JournalEvent::ToolExecuted { ts, .. }
            | JournalEvent::IterationEnd { ts, .. }
            | JournalEvent::Complete { ts, .. }
            | JournalEvent::Fail { ts, .. }
            | JournalEvent::Stuck { ts, .. }
            | JournalEvent::Abandoned { ts, .. } => *ts,
        }
    }
}
