//! LottoBook - numbers-game betting engine
//!
//! Shops sell number bets to members; tickets are priced against payout-rate
//! profiles with per-number risk overrides, and an operator's result settles
//! every ticket of the round exactly once.
//!
//! ## Architecture
//!
//! - **Storage**: ReDB (ACID, single writer) + DashMap balance cache
//! - **Core**: RoundScheduler → TicketPricer → LedgerGuard → SettlementEngine
//! - **Server**: Axum, actor resolved upstream and passed in headers
//! - **Money**: `rust_decimal`, never floats

pub mod api;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod pricing;
pub mod risk;
pub mod schedule;
pub mod settlement;
pub mod storage;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use config::{Config, ConfigError};
pub use engine::{
    BatchRisk, CancelReceipt, IssueResult, LottoEngine, NewRisk, SubmitTicket, TicketFilter,
};
pub use error::{BetBound, LottoError, LottoResult};
pub use models::{
    Actor, BetRequest, LedgerEntry, LedgerReason, LotteryConfig, NumberRisk, RateEntry, RateProfile, RiskType,
    Role, RoundResult, ScheduleRules, ScheduleType, Ticket, TicketLine, TicketStatus, UserAccount,
};
pub use schedule::{Clock, FixedClock, RoundScheduler, SystemClock};
pub use settlement::{SettlementSummary, WinningNumbers};
pub use storage::Store;
