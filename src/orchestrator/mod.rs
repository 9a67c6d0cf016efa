//! Run orchestration
//!
//! - Orchestrator: single-flight command intake and resume
//! - RecoveryManager: resume or abandon runs a crash left incomplete

mod recovery;
mod service;

pub use recovery::{RecoveryAction, RecoveryManager, RecoveryResult, RecoveryStats};
pub use service::{BUSY_MESSAGE, ContextProvider, NoContext, Orchestrator};
