//! Caller hooks for a running task.

use async_trait::async_trait;

use crate::domain::RunPhase;
use crate::safety::ConfirmationRequest;

/// Hooks the loop calls while a run is in flight.
///
/// `confirm` may suspend for as long as the user takes to answer.
#[async_trait]
pub trait RunCallbacks: Send + Sync {
    fn on_state_change(&self, _phase: RunPhase) {}

    fn on_message(&self, _message: &str) {}

    /// Ask the user whether a gated action may run.
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Callbacks that answer every confirmation the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAnswer {
    pub approve: bool,
}

impl FixedAnswer {
    pub fn approve() -> Self {
        Self { approve: true }
    }

    pub fn decline() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl RunCallbacks for FixedAnswer {
    fn on_message(&self, message: &str) {
        log::debug!("{}", message);
    }

    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        log::info!(
            "{} {} ({})",
            if self.approve { "Auto-approving" } else { "Auto-declining" },
            request.tool,
            request.tier
        );
        self.approve
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RiskTier;

    #[tokio::test]
    async fn test_fixed_answer() {
        let request = ConfirmationRequest {
            tool: "run_shell".to_string(),
            params: serde_json::json!({"command": "rm -rf build"}),
            tier: RiskTier::Tier3,
            reason: "destructive shell command".to_string(),
            remembered: false,
        };
        assert!(FixedAnswer::approve().confirm(&request).await);
        assert!(!FixedAnswer::decline().confirm(&request).await);
    }
}
