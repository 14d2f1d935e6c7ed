//! Ticket pricing: payout-rate resolution and per-line risk adjustment.
//!
//! Pure functions over already-loaded configuration. Nothing in here touches
//! storage, so a ticket can be priced (and rejected) before any money moves.

pub mod pricer;
pub mod rates;

pub use pricer::{PricedLine, PricedTicket, TicketPricer};
pub use rates::{RateResolver, ResolvedRate};

/// Digit count required by the built-in bet types
pub fn number_width(bet_type: &str) -> Option<usize> {
    match bet_type {
        "3top" | "3tod" => Some(3),
        "2up" | "2down" => Some(2),
        "run_up" | "run_down" => Some(1),
        _ => None,
    }
}
