//! Domain types for deskloop
//!
//! - Command: a goal submitted by a caller
//! - Action: the model's parsed next step
//! - ActionFingerprint / FingerprintRing: repetition detection
//! - RunState: per-run state owned by the loop
//! - JournalEvent: append-only run history
//! - RunResult / RunOutcome / RunPhase: how runs end and report progress
//! - RiskTier: safety classification

pub mod action;
pub mod command;
pub mod event;
pub mod fingerprint;
pub mod outcome;
pub mod risk;
pub mod run_state;

pub use action::{Action, ActionParseError, parse_action};
pub use command::{Command, CommandSource};
pub use event::JournalEvent;
pub use fingerprint::{ActionFingerprint, FingerprintRing};
pub use outcome::{RunOutcome, RunPhase, RunResult, as_sentence};
pub use risk::RiskTier;
pub use run_state::{LastAction, ProgressLog, RunState};

/// Truncate to at most `max_chars` characters, marking the cut with "...".
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
