//! Mutable state of one run, owned by the loop that drives it.

use std::collections::VecDeque;

use super::fingerprint::{ActionFingerprint, FingerprintRing};
use super::outcome::RunOutcome;
use super::truncate;
use crate::llm::Usage;

const MAX_PROGRESS_LINE: usize = 200;

/// Bounded rolling log carried from one iteration's prompt to the next.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    capacity: usize,
    lines: VecDeque<String>,
}

impl ProgressLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::new(),
        }
    }

    pub fn push(&mut self, line: impl AsRef<str>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(truncate(line.as_ref().trim(), MAX_PROGRESS_LINE));
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Record of the most recently dispatched action.
#[derive(Debug, Clone, PartialEq)]
pub struct LastAction {
    pub iteration: u32,
    pub summary: String,
    pub result: String,
    pub is_error: bool,
}

#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub goal: String,
    iteration: u32,
    outcome: Option<RunOutcome>,
    progress: ProgressLog,
    last_action: Option<LastAction>,
    ring: FingerprintRing,
    consecutive_same: u32,
    consecutive_failures: u32,
    tokens: Usage,
    last_score: Option<f64>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, goal: impl Into<String>, progress_lines: usize, window: usize) -> Self {
        Self {
            run_id: run_id.into(),
            goal: goal.into(),
            iteration: 0,
            outcome: None,
            progress: ProgressLog::new(progress_lines),
            last_action: None,
            ring: FingerprintRing::new(window),
            consecutive_same: 0,
            consecutive_failures: 0,
            tokens: Usage::default(),
            last_score: None,
        }
    }

    /// Continue a run from a journal snapshot, carrying its token usage forward.
    pub fn resume_from(&mut self, iterations: u32, progress: &[String], last_score: Option<f64>, tokens: Usage) {
        self.iteration = iterations;
        self.tokens = tokens;
        for line in progress {
            self.progress.push(line);
        }
        self.last_score = last_score;
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Advance the iteration counter and return the new value.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    /// Record a dispatched action's fingerprint.
    ///
    /// The consecutive counter includes this action, so two identical
    /// actions in a row yield 2.
    pub fn record_fingerprint(&mut self, fingerprint: ActionFingerprint) {
        if self.ring.last().is_some_and(|last| last.matches(&fingerprint)) {
            self.consecutive_same += 1;
        } else {
            self.consecutive_same = 1;
        }
        self.ring.push(fingerprint);
    }

    pub fn consecutive_repeats(&self) -> u32 {
        self.consecutive_same
    }

    pub fn fingerprints(&self) -> &FingerprintRing {
        &self.ring
    }

    /// Either heuristic firing means the model is repeating itself.
    pub fn is_stuck(&self, consecutive_threshold: u32, window_threshold: usize) -> bool {
        if self.consecutive_same >= consecutive_threshold {
            return true;
        }
        self.ring
            .last()
            .map(|last| self.ring.count(last) >= window_threshold)
            .unwrap_or(false)
    }

    /// Count one failure and return the running total.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Fold a tool result into the state.
    pub fn record_tool_result(&mut self, summary: &str, result: &str, is_error: bool, note: Option<&str>) {
        if is_error {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }

        let status = if is_error { "error" } else { "ok" };
        let mut line = format!("#{} {} -> {}: {}", self.iteration, summary, status, first_line(result));
        if let Some(note) = note {
            line.push_str(&format!(" ({})", note));
        }
        self.progress.push(line);

        self.last_action = Some(LastAction {
            iteration: self.iteration,
            summary: summary.to_string(),
            result: truncate(result, MAX_PROGRESS_LINE),
            is_error,
        });
    }

    pub fn push_progress(&mut self, line: impl AsRef<str>) {
        self.progress.push(line);
    }

    pub fn progress(&self) -> &ProgressLog {
        &self.progress
    }

    pub fn last_action(&self) -> Option<&LastAction> {
        self.last_action.as_ref()
    }

    pub fn add_usage(&mut self, usage: &Usage) {
        self.tokens.add(usage);
    }

    pub fn tokens(&self) -> Usage {
        self.tokens
    }

    pub fn set_score(&mut self, score: Option<f64>) {
        if score.is_some() {
            self.last_score = score;
        }
    }

    pub fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    /// Mark the run complete. Returns false if it had already ended.
    pub fn complete(&mut self, reason: impl Into<String>) -> bool {
        self.terminate(RunOutcome::Completed(reason.into()))
    }

    /// Mark the run failed. Returns false if it had already ended.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.terminate(RunOutcome::Failed(reason.into()))
    }

    fn terminate(&mut self, outcome: RunOutcome) -> bool {
        if let Some(existing) = &self.outcome {
            log::warn!(
                "Run {} already ended ({}), ignoring {:?}",
                self.run_id,
                existing.reason(),
                outcome
            );
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, Some(RunOutcome::Completed(_)))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Some(RunOutcome::Failed(_)))
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
