//! Number risk directives (suppressed / half-paid numbers)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bet-type wildcard: the directive applies to every bet type of the number
pub const ALL_BET_TYPES: &str = "ALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskType {
    /// Accepted for the record, priced at zero, never pays
    Close,
    /// Pays half the configured rate
    Half,
}

impl RiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::Close => "CLOSE",
            RiskType::Half => "HALF",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRisk {
    pub id: String,
    pub lottery_id: String,
    /// `None` applies to every shop selling the lottery
    #[serde(default)]
    pub shop_id: Option<String>,
    pub number: String,
    /// A concrete bet type, or [`ALL_BET_TYPES`]
    pub bet_type: String,
    pub risk_type: RiskType,
    /// Scopes the directive to the local calendar day it falls on
    pub created_at: DateTime<Utc>,
}

impl NumberRisk {
    pub fn applies_to_shop(&self, shop_id: &str) -> bool {
        self.shop_id.as_deref().map_or(true, |s| s == shop_id)
    }

    pub fn is_wildcard(&self) -> bool {
        self.bet_type.eq_ignore_ascii_case(ALL_BET_TYPES)
    }
}
