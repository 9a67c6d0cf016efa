//! Error types for deskloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;

/// All error types that can occur in deskloop
#[derive(Debug, Error)]
pub enum DeskloopError {
    /// Run has no journal on disk
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Journal persistence or replay error
    #[error("Journal error: {0}")]
    Journal(String),

    /// LLM transport error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Tool execution or dispatch error
    #[error("Tool error: {0}")]
    Tool(String),

    /// Plugin manifest or protocol error
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for deskloop operations
pub type Result<T> = std::result::Result<T, DeskloopError>;
