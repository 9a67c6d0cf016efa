//! Risk tiers governing automatic execution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Risk classification of one action.
///
/// Ordered so that `max` picks the riskier tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Runs without asking
    Tier1,
    /// Asks once, then approved for the session
    Tier2,
    /// Asks every time; never cached
    Tier3,
}

impl RiskTier {
    pub fn number(&self) -> u8 {
        match self {
            RiskTier::Tier1 => 1,
            RiskTier::Tier2 => 2,
            RiskTier::Tier3 => 3,
        }
    }

    /// Map a 0-10 risk score onto a tier.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => RiskTier::Tier1,
            4..=6 => RiskTier::Tier2,
            _ => RiskTier::Tier3,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.number())
    }
}
