//! Model-based risk scoring for actions the heuristics cannot place.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::RiskTier;
use crate::domain::action::extract_json_object;
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};
use crate::observe::Observation;

const SCORER_SYSTEM: &str = "You rate the risk of a single desktop automation action. \
Reply with only a JSON object {\"risk\": N} where N is an integer from 0 (harmless, read-only) \
to 10 (destructive or irreversible). Consider what is visible on screen.";

/// Scores one action into a risk tier.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score(&self, tool: &str, params: &Value, observation: Option<&Observation>) -> Result<RiskTier, LlmError>;
}

/// Asks the model for a 0-10 risk score.
pub struct LlmRiskScorer {
    client: Arc<dyn LlmClient>,
    model: Option<String>,
}

impl LlmRiskScorer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, model: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl RiskScorer for LlmRiskScorer {
    async fn score(&self, tool: &str, params: &Value, observation: Option<&Observation>) -> Result<RiskTier, LlmError> {
        let text = format!("Action: {}\nParameters: {}", tool, params);
        let message = match observation {
            Some(obs) => Message::user_with_image(text, obs.media_type.clone(), obs.image.clone()),
            None => Message::user(text),
        };
        let mut request = CompletionRequest::new(SCORER_SYSTEM)
            .with_message(message)
            .with_max_tokens(32);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let response = self.client.complete(request).await?;
        let score = parse_risk_score(&response.content)
            .ok_or_else(|| LlmError::InvalidResponse(format!("no risk score in {:?}", response.content)))?;
        log::debug!("Risk scorer rated {} at {}", tool, score);
        Ok(RiskTier::from_score(score))
    }
}

/// Pull `risk` out of a `{"risk": N}` reply.
pub fn parse_risk_score(text: &str) -> Option<u8> {
    let json = extract_json_object(text)?;
    let value: Value = serde_json::from_str(json).ok()?;
    let risk = value.get("risk")?.as_f64()?;
    if !risk.is_finite() {
        return None;
    }
    Some(risk.round().clamp(0.0, 10.0) as u8)
}
