//! TicketPricer: validates and prices every line of a submission.

use rust_decimal::Decimal;
use serde::Serialize;

use super::number_width;
use super::rates::{RateResolver, ResolvedRate};
use crate::error::{BetBound, LottoError, LottoResult};
use crate::models::{BetRequest, RiskType, TicketLine, TicketStatus};
use crate::risk::RiskTable;

/// Upper bound on lines in one ticket
pub const MAX_LINES_PER_TICKET: usize = 500;

/// Upper bound on the stake of a single line
pub const MAX_LINE_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// One line after risk adjustment, ready to persist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedLine {
    pub number: String,
    pub bet_type: String,
    /// What the member asked to stake
    pub requested: Decimal,
    /// What is actually charged (0 when suppressed)
    pub amount: Decimal,
    pub reward_rate: Decimal,
    pub risk: Option<RiskType>,
}

impl PricedLine {
    pub fn into_ticket_line(self) -> TicketLine {
        TicketLine {
            number: self.number,
            bet_type: self.bet_type,
            amount: self.amount,
            reward_rate: self.reward_rate,
            winning_amount: Decimal::ZERO,
            status: TicketStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedTicket {
    pub lines: Vec<PricedLine>,
    pub total_amount: Decimal,
}

impl PricedTicket {
    pub fn suppressed_count(&self) -> usize {
        self.lines.iter().filter(|l| l.risk == Some(RiskType::Close)).count()
    }
}

pub struct TicketPricer<'a> {
    rates: RateResolver<'a>,
    risks: &'a RiskTable,
}

impl<'a> TicketPricer<'a> {
    pub fn new(rates: RateResolver<'a>, risks: &'a RiskTable) -> Self {
        Self { rates, risks }
    }

    /// Price a whole submission. Any invalid line rejects the ticket.
    pub fn price(&self, bets: &[BetRequest]) -> LottoResult<PricedTicket> {
        if bets.is_empty() {
            return Err(LottoError::InvalidBet("ticket has no lines".to_string()));
        }
        if bets.len() > MAX_LINES_PER_TICKET {
            return Err(LottoError::InvalidBet(format!(
                "ticket has {} lines, limit is {}",
                bets.len(),
                MAX_LINES_PER_TICKET
            )));
        }

        let lines = bets
            .iter()
            .map(|bet| self.price_line(bet))
            .collect::<LottoResult<Vec<_>>>()?;
        let total_amount = lines
            .iter()
            .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.amount))
            .ok_or_else(|| LottoError::InvalidBet("ticket total is out of range".to_string()))?;

        Ok(PricedTicket { lines, total_amount })
    }

    pub fn price_line(&self, bet: &BetRequest) -> LottoResult<PricedLine> {
        let number = bet.number.trim();
        let bet_type = bet.bet_type.trim();
        validate_line(number, bet_type, bet.amount)?;

        let risk = self.risks.lookup(number, bet_type);

        if risk == Some(RiskType::Close) {
            return Ok(PricedLine {
                number: number.to_string(),
                bet_type: bet_type.to_string(),
                requested: bet.amount,
                amount: Decimal::ZERO,
                reward_rate: Decimal::ZERO,
                risk,
            });
        }

        let rate = self
            .rates
            .resolve(bet_type)
            .filter(ResolvedRate::is_payable)
            .ok_or_else(|| LottoError::UnconfiguredRate(bet_type.to_string()))?;
        check_limits(bet_type, bet.amount, &rate)?;

        let reward_rate = match risk {
            Some(RiskType::Half) => rate.pay / Decimal::TWO,
            _ => rate.pay,
        };
        // The potential payout must stay representable for settlement
        if bet.amount.checked_mul(reward_rate).is_none() {
            return Err(LottoError::InvalidBet(format!("payout for {} is out of range", number)));
        }

        Ok(PricedLine {
            number: number.to_string(),
            bet_type: bet_type.to_string(),
            requested: bet.amount,
            amount: bet.amount,
            reward_rate,
            risk,
        })
    }
}

fn validate_line(number: &str, bet_type: &str, amount: Decimal) -> LottoResult<()> {
    if bet_type.is_empty() {
        return Err(LottoError::InvalidBet("missing bet type".to_string()));
    }
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LottoError::InvalidBet(format!("number '{}' must be digits only", number)));
    }
    if let Some(width) = number_width(bet_type) {
        if number.len() != width {
            return Err(LottoError::InvalidBet(format!(
                "{} takes {}-digit numbers, got '{}'",
                bet_type, width, number
            )));
        }
    }
    if amount <= Decimal::ZERO {
        return Err(LottoError::InvalidBet(format!("amount for {} must be positive", number)));
    }
    if amount > MAX_LINE_AMOUNT {
        return Err(LottoError::InvalidBet(format!(
            "amount for {} exceeds the line ceiling of {}",
            number, MAX_LINE_AMOUNT
        )));
    }
    Ok(())
}

fn check_limits(bet_type: &str, amount: Decimal, rate: &ResolvedRate) -> LottoResult<()> {
    if amount < rate.min {
        return Err(LottoError::BetLimitViolation {
            bet_type: bet_type.to_string(),
            bound: BetBound::Min,
            limit: rate.min,
        });
    }
    if let Some(max) = rate.max_limit() {
        if amount > max {
            return Err(LottoError::BetLimitViolation {
                bet_type: bet_type.to_string(),
                bound: BetBound::Max,
                limit: max,
            });
        }
    }
    Ok(())
}
