//! Error types for the betting engine.
//!
//! Business rejections (bad bet, closed market, insufficient funds, ...) and
//! storage/integrity failures share one enum. `is_rejection()` tells them
//! apart so the transport layer can map them to 4xx vs 5xx.

use rust_decimal::Decimal;
use serde::Serialize;

/// Result type for engine operations
pub type LottoResult<T> = Result<T, LottoError>;

/// Which configured bet limit a line violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BetBound {
    Min,
    Max,
}

impl std::fmt::Display for BetBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BetBound::Min => write!(f, "minimum"),
            BetBound::Max => write!(f, "maximum"),
        }
    }
}

/// Engine errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LottoError {
    #[error("Lottery not found: {0}")]
    LotteryNotFound(String),

    #[error("Lottery is not accepting bets (inactive)")]
    LotteryInactive,

    #[error("Market closed: {0}")]
    LotteryClosed(String),

    #[error("No round open today")]
    NoRoundToday,

    #[error("No payout rate configured for type {0}")]
    UnconfiguredRate(String),

    #[error("Bet {bound} for {bet_type} is {limit}")]
    BetLimitViolation {
        bet_type: String,
        bound: BetBound,
        limit: Decimal,
    },

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Insufficient funds: short by {shortfall}")]
    InsufficientFunds { shortfall: Decimal },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Ticket cannot be changed in status {status}")]
    InvalidTicketState { status: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid result: {0}")]
    InvalidResult(String),

    #[error("No live lottery shares product code {0}")]
    DuplicateLotteryNotFound(String),

    #[error("Risk entry not found: {0}")]
    RiskNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LottoError {
    /// True for business rejections surfaced to the caller as-is.
    /// False for storage and integrity failures (logged, whole operation rolled back).
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LottoError::Storage(_))
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            LottoError::LotteryNotFound(_) => "lottery_not_found",
            LottoError::LotteryInactive => "lottery_inactive",
            LottoError::LotteryClosed(_) => "lottery_closed",
            LottoError::NoRoundToday => "no_round_today",
            LottoError::UnconfiguredRate(_) => "unconfigured_rate",
            LottoError::BetLimitViolation { .. } => "bet_limit_violation",
            LottoError::InvalidBet(_) => "invalid_bet",
            LottoError::InsufficientFunds { .. } => "insufficient_funds",
            LottoError::AccountNotFound(_) => "account_not_found",
            LottoError::AccountExists(_) => "account_exists",
            LottoError::TicketNotFound(_) => "ticket_not_found",
            LottoError::InvalidTicketState { .. } => "invalid_ticket_state",
            LottoError::Forbidden(_) => "forbidden",
            LottoError::InvalidResult(_) => "invalid_result",
            LottoError::DuplicateLotteryNotFound(_) => "duplicate_lottery_not_found",
            LottoError::RiskNotFound(_) => "risk_not_found",
            LottoError::Storage(_) => "storage_error",
        }
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for LottoError {
                fn from(e: $ty) -> Self {
                    LottoError::Storage(e.to_string())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    serde_json::Error,
    std::io::Error,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_violation_names_type_and_bound() {
        let err = LottoError::BetLimitViolation {
            bet_type: "2up".to_string(),
            bound: BetBound::Max,
            limit: Decimal::from(1000),
        };
        let msg = err.to_string();
        assert!(msg.contains("2up"));
        assert!(msg.contains("maximum"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn test_storage_errors_are_not_rejections() {
        assert!(!LottoError::Storage("disk".into()).is_rejection());
        assert!(LottoError::NoRoundToday.is_rejection());
        assert!(LottoError::InsufficientFunds { shortfall: Decimal::ONE }.is_rejection());
    }
}
