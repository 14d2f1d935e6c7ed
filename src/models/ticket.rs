//! Tickets, bet lines and round results

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status shared by tickets and their lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Pending,
    Win,
    Lose,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Win => "WIN",
            TicketStatus::Lose => "LOSE",
            TicketStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "PENDING" => Some(TicketStatus::Pending),
            "WIN" => Some(TicketStatus::Win),
            "LOSE" => Some(TicketStatus::Lose),
            "CANCELLED" => Some(TicketStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested bet line of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRequest {
    pub number: String,
    pub bet_type: String,
    pub amount: Decimal,
}

impl BetRequest {
    pub fn new(number: impl Into<String>, bet_type: impl Into<String>, amount: Decimal) -> Self {
        Self { number: number.into(), bet_type: bet_type.into(), amount }
    }
}

/// A persisted bet line.
///
/// `amount` and `reward_rate` are frozen at submission (after risk adjustment);
/// `winning_amount` and `status` are written only by settlement or cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketLine {
    pub number: String,
    pub bet_type: String,
    pub amount: Decimal,
    pub reward_rate: Decimal,
    pub winning_amount: Decimal,
    pub status: TicketStatus,
}

/// A purchase header with its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub shop_id: String,
    pub user_id: String,
    pub lottery_id: String,
    pub round_date: NaiveDate,
    #[serde(default)]
    pub note: Option<String>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub commission_amount: Decimal,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
    pub lines: Vec<TicketLine>,
}

impl Ticket {
    /// Sum of what settlement has credited for this ticket so far
    pub fn paid_out(&self) -> Decimal {
        if self.status != TicketStatus::Win {
            return Decimal::ZERO;
        }
        self.lines
            .iter()
            .filter(|line| line.status == TicketStatus::Win)
            .map(|line| line.winning_amount)
            .sum()
    }

    pub fn lines_total(&self) -> Decimal {
        self.lines.iter().map(|line| line.amount).sum()
    }
}

/// Winning numbers of one (lottery, round_date)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub lottery_id: String,
    pub round_date: NaiveDate,
    pub top_3: String,
    pub bottom_2: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
    /// 1 on first issuance, incremented by every correction
    pub revision: u32,
}
