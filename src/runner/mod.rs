//! Reactive loop runner
//!
//! - LoopBudgets: iteration, failure and repetition limits
//! - Prompt assembly from the goal and the rolling progress log
//! - ReactiveLoop: observe, think, act until done or out of budget

mod prompt;
mod reactive_loop;

use std::time::Duration;

pub use prompt::{PromptInput, build_system_prompt, build_user_text};
pub use reactive_loop::{ReactiveLoop, RunTarget};

/// Limits that bound one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBudgets {
    /// Iterations across the whole run, including resumed ones
    pub max_iterations: u32,
    pub max_consecutive_failures: u32,
    /// Capacity of the recent-fingerprint ring
    pub fingerprint_window: usize,
    /// Same action this many times in a row counts as stuck
    pub consecutive_repeat_threshold: u32,
    /// Same action this many times inside the window counts as stuck
    pub window_repeat_threshold: usize,
    pub progress_log_lines: usize,
    /// Pause between iterations so the UI can settle
    pub iteration_pause: Duration,
    /// Coordinate jitter ignored by fingerprints, in pixels
    pub coordinate_tolerance_px: u32,
}

impl Default for LoopBudgets {
    fn default() -> Self {
        Self {
            max_iterations: 35,
            max_consecutive_failures: 3,
            fingerprint_window: 8,
            consecutive_repeat_threshold: 2,
            window_repeat_threshold: 3,
            progress_log_lines: 12,
            iteration_pause: Duration::from_millis(400),
            coordinate_tolerance_px: 12,
        }
    }
}
