//! Accounts, actors and the balance journal

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Admin,
    Member,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "superadmin" => Some(Role::Superadmin),
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

/// The already-authenticated caller of an engine operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub shop_id: Option<String>,
}

impl Actor {
    pub fn member(user_id: impl Into<String>, shop_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self { username: user_id.clone(), user_id, role: Role::Member, shop_id: Some(shop_id.into()) }
    }

    pub fn admin(user_id: impl Into<String>, shop_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self { username: user_id.clone(), user_id, role: Role::Admin, shop_id: Some(shop_id.into()) }
    }

    pub fn superadmin(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self { username: user_id.clone(), user_id, role: Role::Superadmin, shop_id: None }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Superadmin | Role::Admin)
    }

    /// Super-admins manage everything; shop admins only their own shop
    pub fn manages_shop(&self, shop_id: Option<&str>) -> bool {
        match self.role {
            Role::Superadmin => true,
            Role::Admin => self.shop_id.is_some() && self.shop_id.as_deref() == shop_id,
            Role::Member => false,
        }
    }

    /// "alice (admin)" - used in ticket notes and audit rows
    pub fn label(&self) -> String {
        let role = match self.role {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Member => "member",
        };
        format!("{} ({})", self.username, role)
    }
}

/// A member's funds as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: String,
    pub username: String,
    pub shop_id: Option<String>,
    pub credit_balance: Decimal,
    #[serde(default)]
    pub commission_percent: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    Opening,
    TicketDebit,
    TicketRefund,
    Settlement,
}

/// One balance movement, written in the same transaction as the movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub delta: Decimal,
    pub balance_after: Decimal,
    pub reason: LedgerReason,
    /// Ticket id, or "{lottery_id}:{round_date}" for settlement
    pub reference: String,
    pub created_at: DateTime<Utc>,
}
