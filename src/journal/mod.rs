//! Event-sourced run journal.
//!
//! The journal for a run is the only durable record of it. Whether a run is
//! incomplete is decided from the stored events alone, so crash detection
//! works after a full restart.

mod replay;
mod store;

pub use replay::{RunSnapshot, TerminalState, ToolCallSummary};
pub use store::{EVENTS_FILE, JournalWriter, RunJournal};
