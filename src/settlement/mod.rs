//! Settlement Module - resolving a round's winning numbers
//!
//! ## Flow:
//! 1. The result is written once per lottery sharing the product code
//! 2. Every non-cancelled ticket of the round is re-evaluated
//! 3. Previous payouts are netted against new ones per user
//! 4. One ledger movement per user, all in the caller's transaction
//!
//! ## Guarantees:
//! - Re-issuing identical numbers changes nothing
//! - A correction converges to the state of issuing the corrected numbers first
//! - CANCELLED tickets are never touched

pub mod engine;
pub mod matcher;

pub use engine::{settle_ticket, SettlementEngine, SettlementSummary, TicketOutcome};
pub use matcher::{is_winner, WinningNumbers};
