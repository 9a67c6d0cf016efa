//! Outcome of one tool dispatch.

use crate::observe::Observation;

/// Text shown to the model next iteration, plus an error flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
    /// Replaces the shared observation when a handler captured a fresher one
    pub updated_observation: Option<Observation>,
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
            updated_observation: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
            updated_observation: None,
        }
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.updated_observation = Some(observation);
        self
    }
}
