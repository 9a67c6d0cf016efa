//! Two-phase safety gate with a per-session approval cache.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use super::classifier::{Classification, classify};
use super::scorer::RiskScorer;
use crate::domain::RiskTier;
use crate::observe::Observation;

/// Where a tier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierSource {
    Heuristic,
    Manifest,
    Fallback,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub tier: RiskTier,
    pub source: TierSource,
    pub reason: String,
}

/// What the gate wants done with an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Assessment),
    /// Needs interactive confirmation
    Ask(Assessment),
    Deny(String),
}

/// Passed to the confirmation callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationRequest {
    pub tool: String,
    pub params: Value,
    pub tier: RiskTier,
    pub reason: String,
    /// An approval will be remembered for the session
    pub remembered: bool,
}

impl ConfirmationRequest {
    pub fn prompt(&self) -> String {
        let remember = if self.remembered { " (approval lasts for this session)" } else { "" };
        format!(
            "Allow {} {} ? [{}: {}]{}",
            self.tool, self.params, self.tier, self.reason, remember
        )
    }
}

pub struct SafetyGate {
    scorer: Option<Arc<dyn RiskScorer>>,
    approvals: Mutex<HashSet<String>>,
    audit: bool,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyGate {
    /// Gate with heuristics only; inconclusive actions land in tier2.
    pub fn new() -> Self {
        Self {
            scorer: None,
            approvals: Mutex::new(HashSet::new()),
            audit: true,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn RiskScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Cache key: tool plus canonical parameters.
    pub fn approval_key(tool: &str, params: &Value) -> String {
        format!("{}|{}", tool, params)
    }

    /// Place an action in a tier.
    ///
    /// `manifest_tier` is the floor declared by a plugin's permissions.
    pub async fn assess(
        &self,
        tool: &str,
        params: &Value,
        manifest_tier: Option<RiskTier>,
        observation: Option<&Observation>,
    ) -> Result<Assessment, String> {
        match classify(tool, params) {
            Classification::Blocked(category) => Err(format!("{} is blocked ({})", tool, category)),
            Classification::Tier(tier, category) => Ok(Assessment {
                tier: manifest_tier.map_or(tier, |floor| floor.max(tier)),
                source: TierSource::Heuristic,
                reason: category.to_string(),
            }),
            Classification::Inconclusive => match manifest_tier {
                Some(tier) => Ok(Assessment {
                    tier,
                    source: TierSource::Manifest,
                    reason: "declared plugin permissions".to_string(),
                }),
                None => Ok(self.fallback(tool, params, observation).await),
            },
        }
    }

    async fn fallback(&self, tool: &str, params: &Value, observation: Option<&Observation>) -> Assessment {
        let default = Assessment {
            tier: RiskTier::Tier2,
            source: TierSource::Default,
            reason: "unrecognised action".to_string(),
        };
        let Some(scorer) = &self.scorer else {
            return default;
        };
        match scorer.score(tool, params, observation).await {
            Ok(tier) => Assessment {
                tier,
                source: TierSource::Fallback,
                reason: "model risk score".to_string(),
            },
            Err(e) => {
                log::warn!("Risk scorer failed for {}: {}; assuming tier2", tool, e);
                default
            }
        }
    }

    /// Turn an assessment into a decision, consulting the session cache.
    pub fn decide(&self, tool: &str, params: &Value, assessment: Assessment) -> Decision {
        match assessment.tier {
            RiskTier::Tier1 => Decision::Allow(assessment),
            RiskTier::Tier2 if self.is_approved(tool, params) => {
                if self.audit {
                    log::info!("Audit: {} allowed by session approval ({})", tool, assessment.reason);
                }
                Decision::Allow(assessment)
            }
            RiskTier::Tier2 | RiskTier::Tier3 => Decision::Ask(assessment),
        }
    }

    /// Assess and decide in one step.
    pub async fn evaluate(
        &self,
        tool: &str,
        params: &Value,
        manifest_tier: Option<RiskTier>,
        observation: Option<&Observation>,
    ) -> Decision {
        match self.assess(tool, params, manifest_tier, observation).await {
            Ok(assessment) => self.decide(tool, params, assessment),
            Err(reason) => {
                log::warn!("Safety gate denied {}: {}", tool, reason);
                Decision::Deny(reason)
            }
        }
    }

    /// Build the confirmation request for an `Ask` decision.
    pub fn confirmation_request(tool: &str, params: &Value, assessment: &Assessment) -> ConfirmationRequest {
        ConfirmationRequest {
            tool: tool.to_string(),
            params: params.clone(),
            tier: assessment.tier,
            reason: assessment.reason.clone(),
            remembered: assessment.tier == RiskTier::Tier2,
        }
    }

    /// Remember a user approval. Only tier2 approvals are cached.
    pub fn record_approval(&self, tool: &str, params: &Value, tier: RiskTier) {
        if tier != RiskTier::Tier2 {
            return;
        }
        let key = Self::approval_key(tool, params);
        if self.audit {
            log::info!("Audit: session approval granted for {}", key);
        }
        self.approvals.lock().unwrap_or_else(|e| e.into_inner()).insert(key);
    }

    pub fn is_approved(&self, tool: &str, params: &Value) -> bool {
        self.approvals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&Self::approval_key(tool, params))
    }

    /// Forget every session approval.
    pub fn clear_session(&self) {
        self.approvals.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
