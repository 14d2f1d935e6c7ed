//! RateResolver: bet type → (pay, min, max)

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{RateEntry, RateProfile};

/// A rate entry with defaults applied. `max == 0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedRate {
    pub pay: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

impl ResolvedRate {
    pub fn max_limit(&self) -> Option<Decimal> {
        if self.max > Decimal::ZERO {
            Some(self.max)
        } else {
            None
        }
    }

    pub fn is_payable(&self) -> bool {
        self.pay > Decimal::ZERO
    }
}

impl From<&RateEntry> for ResolvedRate {
    fn from(entry: &RateEntry) -> Self {
        match entry {
            RateEntry::Scalar(pay) => ResolvedRate { pay: *pay, min: Decimal::ONE, max: Decimal::ZERO },
            RateEntry::Detailed { pay, min, max } => ResolvedRate {
                pay: *pay,
                min: min.unwrap_or(Decimal::ONE),
                max: max.unwrap_or(Decimal::ZERO),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateResolver<'a> {
    rates: Option<&'a HashMap<String, RateEntry>>,
}

impl<'a> RateResolver<'a> {
    /// A lottery without a linked profile resolves nothing
    pub fn new(profile: Option<&'a RateProfile>) -> Self {
        Self { rates: profile.map(|p| &p.rates) }
    }

    /// `None` when the bet type has no entry at all
    pub fn resolve(&self, bet_type: &str) -> Option<ResolvedRate> {
        self.rates?.get(bet_type).map(ResolvedRate::from)
    }
}
