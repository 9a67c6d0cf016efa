//! LLM Client Layer - transport abstraction and Anthropic API integration
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait and transport errors
//! - AnthropicClient implementation
//! - MockLlmClient for scripted tests

pub mod anthropic;
pub mod client;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, LlmError, MockLlmClient};
pub use types::{
    CompletionRequest, CompletionResponse, ContentPart, Message, Role, StopReason, ToolCall, ToolDefinition, Usage,
};
