//! Safety gating for side-effecting actions.
//!
//! - **Heuristic**: pattern classification into tiers (near-zero cost)
//! - **Fallback**: model risk score, only for inconclusive actions
//! - **Gate**: tier -> allow / ask / deny, with tier2 session approvals

mod classifier;
mod gate;
mod scorer;

pub use crate::domain::RiskTier;
pub use classifier::{Classification, classify, classify_command, classify_script, permission_tier, permissions_tier};
pub use gate::{Assessment, ConfirmationRequest, Decision, SafetyGate, TierSource};
pub use scorer::{LlmRiskScorer, RiskScorer, parse_risk_score};
