//! Core LLM client trait, transport errors, and a scripted mock

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse, Usage};

/// Stateless LLM client - each call is independent (fresh context)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Default model used when the request does not name one
    fn model(&self) -> &str;
}

/// Errors surfaced by an LLM transport
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("Not authenticated with the model provider")]
    Unauthenticated,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Could not parse response: {0}")]
    Parse(String),

    #[error("Network error: {message}")]
    Network {
        message: String,
        timed_out: bool,
        connect: bool,
    },
}

impl LlmError {
    /// Create an HTTP status error
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a network timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: true,
            connect: false,
        }
    }

    /// Create a connection failure error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: false,
            connect: true,
        }
    }
}

/// Mock LLM client replaying a scripted queue of outcomes
///
/// Every request is recorded so tests can inspect the prompts that were sent.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    /// Create a mock with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that replays the given outcomes in order
    pub fn with_script(script: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a text reply
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(Ok(CompletionResponse::text(text, Usage::new(100, 20))));
    }

    /// Queue a transport error
    pub fn push_error(&self, error: LlmError) {
        self.push(Err(error));
    }

    fn push(&self, outcome: Result<CompletionResponse, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.script
            .lock()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("mock script exhausted".to_string())))
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_display() {
        assert_eq!(
            LlmError::http(500, "boom").to_string(),
            "API error 500: boom"
        );
        assert_eq!(
            LlmError::Unauthenticated.to_string(),
            "Not authenticated with the model provider"
        );
    }

    #[test]
    fn test_network_constructors() {
        assert!(matches!(
            LlmError::timeout("slow"),
            LlmError::Network { timed_out: true, connect: false, .. }
        ));
        assert!(matches!(
            LlmError::connect("refused"),
            LlmError::Network { timed_out: false, connect: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_mock_replays_script_in_order() {
        let mock = MockLlmClient::new();
        mock.push_text("first");
        mock.push_error(LlmError::http(503, "busy"));

        let first = mock.complete(CompletionRequest::new("s")).await.unwrap();
        assert_eq!(first.content, "first");

        let second = mock.complete(CompletionRequest::new("s")).await;
        assert_eq!(second.unwrap_err(), LlmError::http(503, "busy"));

        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_exhausted_script_is_error() {
        let mock = MockLlmClient::new();
        let result = mock.complete(CompletionRequest::new("s")).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let mock = MockLlmClient::with_script(vec![Ok(CompletionResponse::default())]);
        mock.complete(CompletionRequest::new("system text").with_user_message("go"))
            .await
            .unwrap();
        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, "system text");
        assert_eq!(mock.model(), "mock-model");
    }
}
