//! Domain records persisted by the engine.
//!
//! Everything here is plain data with serde derives; behaviour lives in the
//! scheduler, pricer, ledger and settlement modules.

pub mod account;
pub mod lottery;
pub mod risk;
pub mod ticket;

pub use account::{Actor, LedgerEntry, LedgerReason, Role, UserAccount};
pub use lottery::{LotteryConfig, RateEntry, RateProfile, ScheduleRules, ScheduleType};
pub use risk::{NumberRisk, RiskType, ALL_BET_TYPES};
pub use ticket::{BetRequest, RoundResult, Ticket, TicketLine, TicketStatus};
