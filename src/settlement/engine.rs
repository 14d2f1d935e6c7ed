//! Round settlement.
//!
//! Settling a round always recomputes from scratch: the result row is
//! overwritten, every non-cancelled ticket of the round is re-evaluated, and
//! each user receives one net balance delta (new payout minus what earlier
//! issuances of the same round already paid). Issuing the same numbers twice
//! is therefore a no-op, and a correction never double-pays.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use super::matcher::{is_winner, WinningNumbers};
use crate::error::{LottoError, LottoResult};
use crate::models::{LedgerReason, LotteryConfig, RoundResult, Ticket, TicketStatus};
use crate::storage::{LedgerGuard, StoreTxn};

/// What one issuance did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementSummary {
    pub round_date: NaiveDate,
    pub lottery_ids: Vec<String>,
    pub tickets_processed: usize,
    /// Tickets that ended in WIN
    pub winners: usize,
    /// Gross payout under the current numbers
    pub total_payout: Decimal,
    /// Sum of all balance deltas applied (negative when a correction reclaims)
    pub net_delta: Decimal,
    /// Revision of the result row after this issuance
    pub revision: u32,
}

/// Payout before and after re-evaluating one ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketOutcome {
    pub previous_payout: Decimal,
    pub new_payout: Decimal,
}

impl TicketOutcome {
    pub fn delta(&self) -> Decimal {
        self.new_payout - self.previous_payout
    }
}

fn payout_overflow(ticket_id: &str) -> LottoError {
    LottoError::Storage(format!("payout of ticket {} is out of range", ticket_id))
}

/// Re-evaluate a non-cancelled ticket against `draw` in place
pub fn settle_ticket(ticket: &mut Ticket, draw: &WinningNumbers, now: DateTime<Utc>) -> LottoResult<TicketOutcome> {
    let previous_payout = ticket.paid_out();
    let mut new_payout = Decimal::ZERO;
    let ticket_id = ticket.id.clone();

    for line in ticket.lines.iter_mut().filter(|l| l.status != TicketStatus::Cancelled) {
        let winning_amount = line
            .amount
            .checked_mul(line.reward_rate)
            .ok_or_else(|| payout_overflow(&ticket_id))?;
        // A suppressed line can match but never pays
        if winning_amount > Decimal::ZERO && is_winner(&line.bet_type, &line.number, draw) {
            line.status = TicketStatus::Win;
            line.winning_amount = winning_amount;
            new_payout = new_payout
                .checked_add(winning_amount)
                .ok_or_else(|| payout_overflow(&ticket_id))?;
        } else {
            line.status = TicketStatus::Lose;
            line.winning_amount = Decimal::ZERO;
        }
    }

    ticket.status = if ticket.lines.iter().any(|l| l.status == TicketStatus::Win) {
        TicketStatus::Win
    } else {
        TicketStatus::Lose
    };
    ticket.settled_at = Some(now);

    Ok(TicketOutcome { previous_payout, new_payout })
}

/// Applies one issuance of a round's numbers inside a caller-owned transaction
pub struct SettlementEngine<'a, 't> {
    tx: &'t StoreTxn,
    ledger: &'a mut LedgerGuard<'t>,
    now: DateTime<Utc>,
}

impl<'a, 't> SettlementEngine<'a, 't> {
    pub fn new(tx: &'t StoreTxn, ledger: &'a mut LedgerGuard<'t>, now: DateTime<Utc>) -> Self {
        Self { tx, ledger, now }
    }

    /// Settle `round_date` for every lottery in `targets`.
    ///
    /// Any error leaves the transaction to be dropped, rolling back the
    /// result rows, ticket updates and balance changes together.
    pub fn settle(
        &mut self,
        targets: &[LotteryConfig],
        round_date: NaiveDate,
        draw: &WinningNumbers,
        issued_by: &str,
    ) -> LottoResult<SettlementSummary> {
        let mut revision = 1;
        for lottery in targets {
            revision = self.upsert_result(lottery, round_date, draw, issued_by)?.max(revision);
        }

        // BTreeMap keeps ledger writes in a stable user order
        let mut deltas: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut tickets_processed = 0;
        let mut winners = 0;
        let mut total_payout = Decimal::ZERO;

        for lottery in targets {
            for mut ticket in self.tx.round_tickets(&lottery.id, round_date)? {
                if ticket.status == TicketStatus::Cancelled {
                    continue;
                }
                let outcome = settle_ticket(&mut ticket, draw, self.now)?;
                self.tx.update_ticket(&ticket)?;

                tickets_processed += 1;
                if ticket.status == TicketStatus::Win {
                    winners += 1;
                }
                total_payout = total_payout
                    .checked_add(outcome.new_payout)
                    .ok_or_else(|| payout_overflow(&ticket.id))?;
                let delta = deltas.entry(ticket.user_id.clone()).or_insert(Decimal::ZERO);
                *delta = delta
                    .checked_add(outcome.delta())
                    .ok_or_else(|| payout_overflow(&ticket.id))?;

                debug!(
                    ticket_id = %ticket.id,
                    status = %ticket.status,
                    previous = %outcome.previous_payout,
                    payout = %outcome.new_payout,
                    "ticket settled"
                );
            }
        }

        let code = targets.first().map(|l| l.code.as_str()).unwrap_or_default();
        let reference = format!("{}:{}", code, round_date);
        let mut net_delta = Decimal::ZERO;
        for (user_id, delta) in &deltas {
            if self.ledger.apply_delta(user_id, *delta, LedgerReason::Settlement, &reference)?.is_some() {
                net_delta = net_delta
                    .checked_add(*delta)
                    .ok_or_else(|| LottoError::Storage(format!("net settlement of {} is out of range", reference)))?;
            }
        }

        let summary = SettlementSummary {
            round_date,
            lottery_ids: targets.iter().map(|l| l.id.clone()).collect(),
            tickets_processed,
            winners,
            total_payout,
            net_delta,
            revision,
        };

        info!(
            code = %code,
            round_date = %round_date,
            top_3 = %draw.top_3,
            bottom_2 = %draw.bottom_2,
            tickets = tickets_processed,
            winners = winners,
            total_payout = %total_payout,
            net_delta = %net_delta,
            revision = revision,
            "Round settled"
        );

        Ok(summary)
    }

    fn upsert_result(
        &self,
        lottery: &LotteryConfig,
        round_date: NaiveDate,
        draw: &WinningNumbers,
        issued_by: &str,
    ) -> LottoResult<u32> {
        let revision = self
            .tx
            .result(&lottery.id, round_date)?
            .map(|existing| existing.revision + 1)
            .unwrap_or(1);

        self.tx.put_result(&RoundResult {
            lottery_id: lottery.id.clone(),
            round_date,
            top_3: draw.top_3.clone(),
            bottom_2: draw.bottom_2.clone(),
            issued_by: issued_by.to_string(),
            issued_at: self.now,
            revision,
        })?;
        Ok(revision)
    }
}
