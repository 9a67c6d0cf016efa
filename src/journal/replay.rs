//! Run snapshots reconstructed from journal events.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::domain::{CommandSource, JournalEvent};
use crate::llm::Usage;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    Completed { reason: String },
    Failed { reason: String },
    Abandoned { reason: String },
}

impl TerminalState {
    pub fn from_event(event: &JournalEvent) -> Option<Self> {
        match event {
            JournalEvent::Complete { reason, .. } => Some(TerminalState::Completed { reason: reason.clone() }),
            JournalEvent::Fail { reason, .. } => Some(TerminalState::Failed { reason: reason.clone() }),
            JournalEvent::Abandoned { reason, .. } => Some(TerminalState::Abandoned { reason: reason.clone() }),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TerminalState::Completed { .. } => "completed",
            TerminalState::Failed { .. } => "failed",
            TerminalState::Abandoned { .. } => "abandoned",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            TerminalState::Completed { reason }
            | TerminalState::Failed { reason }
            | TerminalState::Abandoned { reason } => reason,
        }
    }
}

/// One dispatched tool call as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallSummary {
    pub iteration: u32,
    pub tool: String,
    pub is_error: bool,
    pub result: String,
}

/// Minimal run state rebuilt from the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub command: String,
    pub source: Option<CommandSource>,
    pub target_pid: Option<u32>,
    pub iterations: u32,
    pub last_score: Option<f64>,
    pub tool_calls: Vec<ToolCallSummary>,
    pub notes: Vec<String>,
    pub stuck_events: u32,
    pub tokens: Usage,
    pub terminal: Option<TerminalState>,
    pub started_at: Option<u64>,
    pub updated_at: Option<u64>,
}

impl RunSnapshot {
    /// Fold `events` in order. Pure: the same events always give the same snapshot.
    pub fn from_events(run_id: &str, events: &[JournalEvent]) -> Self {
        let mut snapshot = RunSnapshot {
            run_id: run_id.to_string(),
            command: String::new(),
            source: None,
            target_pid: None,
            iterations: 0,
            last_score: None,
            tool_calls: Vec::new(),
            notes: Vec::new(),
            stuck_events: 0,
            tokens: Usage::default(),
            terminal: None,
            started_at: None,
            updated_at: None,
        };

        for event in events {
            snapshot.updated_at = Some(event.ts());
            match event {
                JournalEvent::Created {
                    command,
                    source,
                    target_pid,
                    ts,
                    ..
                } => {
                    snapshot.command = command.clone();
                    snapshot.source = Some(*source);
                    snapshot.target_pid = *target_pid;
                    snapshot.started_at = Some(*ts);
                }
                JournalEvent::IterationStart { iteration, .. } => {
                    snapshot.iterations = snapshot.iterations.max(*iteration);
                }
                JournalEvent::ToolExecuted {
                    iteration,
                    tool,
                    result,
                    is_error,
                    ..
                } => snapshot.tool_calls.push(ToolCallSummary {
                    iteration: *iteration,
                    tool: tool.clone(),
                    is_error: *is_error,
                    result: result.clone(),
                }),
                JournalEvent::IterationEnd {
                    note,
                    score,
                    input_tokens,
                    output_tokens,
                    ..
                } => {
                    if let Some(note) = note {
                        snapshot.notes.push(note.clone());
                    }
                    if score.is_some() {
                        snapshot.last_score = *score;
                    }
                    snapshot.tokens = Usage::new(*input_tokens, *output_tokens);
                }
                JournalEvent::Stuck { .. } => snapshot.stuck_events += 1,
                JournalEvent::Complete {
                    iterations,
                    input_tokens,
                    output_tokens,
                    ..
                }
                | JournalEvent::Fail {
                    iterations,
                    input_tokens,
                    output_tokens,
                    ..
                } => {
                    snapshot.iterations = snapshot.iterations.max(*iterations);
                    snapshot.tokens = Usage::new(*input_tokens, *output_tokens);
                }
                JournalEvent::Abandoned { .. } => {}
            }
            if snapshot.terminal.is_none() {
                snapshot.terminal = TerminalState::from_event(event);
            }
        }
        snapshot
    }

    pub fn is_incomplete(&self) -> bool {
        self.terminal.is_none()
    }

    /// Progress lines suitable for seeding a resumed run.
    pub fn progress_lines(&self) -> Vec<String> {
        self.tool_calls
            .iter()
            .map(|call| {
                let status = if call.is_error { "error" } else { "ok" };
                let first = call.result.lines().next().unwrap_or("").trim();
                format!("#{} {} -> {}: {}", call.iteration, call.tool, status, first)
            })
            .collect()
    }

    /// Human-readable one-paragraph status.
    pub fn status_message(&self) -> String {
        let mut parts = Vec::new();

        let mut head = format!("Run {}", self.run_id);
        if !self.command.is_empty() {
            head.push_str(&format!(" (\"{}\"", self.command));
            if let Some(source) = self.source {
                head.push_str(&format!(" from {}", source));
            }
            head.push(')');
        }
        let iterations = plural(self.iterations, "iteration");
        match &self.terminal {
            Some(TerminalState::Completed { reason }) => {
                head.push_str(&format!(" completed after {}: {}", iterations, reason))
            }
            Some(TerminalState::Failed { reason }) => {
                head.push_str(&format!(" failed after {}: {}", iterations, reason))
            }
            Some(TerminalState::Abandoned { reason }) => {
                head.push_str(&format!(" was abandoned after {}: {}", iterations, reason))
            }
            None => head.push_str(&format!(" is incomplete after {}", iterations)),
        }
        parts.push(end_sentence(head));

        if let Some(started) = self.started_at.and_then(format_ts) {
            parts.push(format!("Started {}.", started));
        }

        if !self.tool_calls.is_empty() {
            let errors = self.tool_calls.iter().filter(|c| c.is_error).count();
            let mut calls = format!(
                "{} ({} failed)",
                plural(self.tool_calls.len() as u32, "tool call"),
                errors
            );
            if let Some(last) = self.tool_calls.last() {
                calls.push_str(&format!(
                    "; last was {} ({})",
                    last.tool,
                    if last.is_error { "error" } else { "ok" }
                ));
            }
            parts.push(end_sentence(calls));
        }

        if let Some(score) = self.last_score {
            parts.push(format!("Last progress score {:.1}/10.", score));
        }
        if self.stuck_events > 0 {
            parts.push(format!("Detected repetition {}.", plural(self.stuck_events, "time")));
        }
        if self.tokens.total() > 0 {
            parts.push(format!(
                "Used {} input and {} output tokens.",
                self.tokens.input_tokens, self.tokens.output_tokens
            ));
        }
        parts.join(" ")
    }
}

fn plural(n: u32, noun: &str) -> String {
    if n == 1 { format!("1 {}", noun) } else { format!("{} {}s", n, noun) }
}

fn end_sentence(mut s: String) -> String {
    if !s.ends_with(['.', '!', '?']) {
        s.push('.');
    }
    s
}

fn format_ts(ms: u64) -> Option<String> {
    let utc = DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).ok()?)?;
    Some(utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
}
