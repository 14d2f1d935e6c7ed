// ============================================================================
// LOTTO ENGINE - the operations the outside world calls
// ============================================================================
//
// submit_ticket : RoundScheduler → RiskTable + RateResolver → TicketPricer
//                 → LedgerGuard.debit + ticket insert (one transaction)
// cancel_ticket : PENDING only, refund through the ledger
// issue_result  : SettlementEngine over every lottery sharing the code
// risk ops      : write, commit, then invalidate the risk cache
//
// Audit events are recorded only after the core transaction commits.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditTrail};
use crate::config::Config;
use crate::error::{LottoError, LottoResult};
use crate::models::{
    Actor, BetRequest, LedgerReason, LotteryConfig, NumberRisk, RateProfile, RiskType, Role, RoundResult, Ticket,
    TicketStatus, UserAccount, ALL_BET_TYPES,
};
use crate::pricing::{number_width, RateResolver, TicketPricer};
use crate::risk::{RiskCache, RiskCacheStats, RiskTable};
use crate::schedule::{Clock, RoundScheduler, SystemClock};
use crate::settlement::{SettlementEngine, SettlementSummary, WinningNumbers};
use crate::storage::{LedgerGuard, LotteryCache, LotteryCacheStats, Store};

/// Rows returned by history reads when no limit is given
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTicket {
    pub lottery_id: String,
    pub bets: Vec<BetRequest>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelReceipt {
    pub ticket_id: String,
    pub refunded_amount: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueResult {
    pub lottery_id: String,
    pub top_3: String,
    pub bottom_2: String,
    /// Defaults to the lottery's current round
    #[serde(default)]
    pub round_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRisk {
    pub lottery_id: String,
    pub number: String,
    /// A bet type, or "ALL" (the default)
    #[serde(default)]
    pub bet_type: Option<String>,
    pub risk_type: RiskType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRisk {
    pub lottery_id: String,
    pub numbers: Vec<String>,
    #[serde(default)]
    pub bet_type: Option<String>,
    pub risk_type: RiskType,
    /// Local day the directives apply to (default: today)
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    /// Local day of purchase
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub lottery_id: Option<String>,
    #[serde(default)]
    pub round_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub risk: RiskCacheStats,
    pub lotteries: LotteryCacheStats,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct LottoEngine {
    store: Store,
    scheduler: RoundScheduler,
    clock: Arc<dyn Clock>,
    risk_cache: RiskCache,
    lottery_cache: LotteryCache,
    audit: AuditTrail,
}

fn sees_lottery(actor: &Actor, lottery: &LotteryConfig) -> bool {
    actor.role == Role::Superadmin || lottery.shop_id.is_none() || lottery.shop_id == actor.shop_id
}

/// Shop the actor's risk directives belong to; super-admins write global ones
fn risk_scope(actor: &Actor) -> Option<String> {
    match actor.role {
        Role::Superadmin => None,
        _ => actor.shop_id.clone(),
    }
}

fn require_staff(actor: &Actor) -> LottoResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(LottoError::Forbidden("staff only".to_string()))
    }
}

fn normalize_bet_type(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => ALL_BET_TYPES.to_string(),
        Some(t) if t.eq_ignore_ascii_case(ALL_BET_TYPES) => ALL_BET_TYPES.to_string(),
        Some(t) => t.to_string(),
    }
}

fn validate_risk_number(number: &str, bet_type: &str) -> LottoResult<()> {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LottoError::InvalidBet(format!("number '{}' must be digits only", number)));
    }
    match number_width(bet_type) {
        Some(width) if number.len() != width => Err(LottoError::InvalidBet(format!(
            "{} takes {}-digit numbers, got '{}'",
            bet_type, width, number
        ))),
        _ => Ok(()),
    }
}

impl LottoEngine {
    pub fn new(store: Store, config: &Config) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Store, config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            scheduler: RoundScheduler::from_config(config),
            risk_cache: RiskCache::new(config.risk_cache_ttl),
            lottery_cache: LotteryCache::new(config.lottery_cache_ttl),
            store,
            clock,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scheduler(&self) -> &RoundScheduler {
        &self.scheduler
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lottery(&self, lottery_id: &str) -> LottoResult<LotteryConfig> {
        self.store
            .lottery(lottery_id)?
            .ok_or_else(|| LottoError::LotteryNotFound(lottery_id.to_string()))
    }

    fn risk_rows(&self, lottery_id: &str) -> LottoResult<Arc<Vec<NumberRisk>>> {
        self.risk_cache.get_or_refresh(lottery_id, || self.store.risks(lottery_id))
    }

    // ------------------------------------------------------------------------
    // Ticket submission
    // ------------------------------------------------------------------------

    /// Price, debit and persist a ticket. Nothing is written unless every
    /// line is valid and the member can pay.
    pub fn submit_ticket(&self, actor: &Actor, request: SubmitTicket) -> LottoResult<Ticket> {
        let now = self.now();
        let shop_id = actor
            .shop_id
            .clone()
            .ok_or_else(|| LottoError::Forbidden("actor has no shop".to_string()))?;

        let lottery = self.lottery(&request.lottery_id)?;
        if !sees_lottery(actor, &lottery) || (lottery.shop_id.is_some() && lottery.shop_id.as_deref() != Some(&shop_id)) {
            return Err(LottoError::LotteryNotFound(request.lottery_id));
        }
        if !lottery.is_active || lottery.is_template {
            return Err(LottoError::LotteryInactive);
        }

        let round_date = self.scheduler.resolve_betting_round(&lottery, now)?;

        let profile = match lottery.rate_profile_id.as_deref() {
            Some(id) => self.store.rate_profile(id)?,
            None => None,
        };
        let rows = self.risk_rows(&lottery.id)?;
        let risks = RiskTable::build(rows.iter(), &shop_id, round_date, |at| self.scheduler.local_day(&lottery, at));
        let priced = TicketPricer::new(RateResolver::new(profile.as_ref()), &risks).price(&request.bets)?;

        let ticket_id = Uuid::new_v4().to_string();
        let tx = self.store.begin()?;
        let mut ledger = LedgerGuard::new(&tx, now);

        let account = ledger.account(&actor.user_id)?;
        if priced.total_amount > Decimal::ZERO {
            ledger.debit(&actor.user_id, priced.total_amount, LedgerReason::TicketDebit, &ticket_id)?;
        }
        let commission_amount = priced
            .total_amount
            .checked_mul(account.commission_percent)
            .map(|c| (c / Decimal::ONE_HUNDRED).round_dp(2))
            .ok_or_else(|| LottoError::InvalidBet(format!("commission for {} is out of range", actor.user_id)))?;

        let ticket = Ticket {
            id: ticket_id,
            shop_id,
            user_id: actor.user_id.clone(),
            lottery_id: lottery.id.clone(),
            round_date,
            note: request.note.filter(|n| !n.trim().is_empty()),
            total_amount: priced.total_amount,
            commission_amount,
            status: TicketStatus::Pending,
            created_at: now,
            settled_at: None,
            lines: priced.lines.into_iter().map(|l| l.into_ticket_line()).collect(),
        };
        tx.insert_ticket(&ticket)?;

        let updates = ledger.finish();
        self.store.commit(tx, updates)?;

        info!(
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            lottery_id = %ticket.lottery_id,
            round_date = %ticket.round_date,
            lines = ticket.lines.len(),
            total = %ticket.total_amount,
            "Ticket submitted"
        );
        self.audit.record(AuditEvent::new(
            "ticket.submit",
            actor,
            ticket.id.clone(),
            json!({ "lottery_id": ticket.lottery_id, "round_date": ticket.round_date, "total_amount": ticket.total_amount }),
            now,
        ));

        Ok(ticket)
    }

    // ------------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------------

    /// Owners may cancel while their round still takes bets; shop staff any
    /// time before settlement.
    pub fn cancel_ticket(&self, actor: &Actor, ticket_id: &str) -> LottoResult<CancelReceipt> {
        let now = self.now();
        let tx = self.store.begin()?;
        let mut ticket = tx
            .ticket(ticket_id)?
            .ok_or_else(|| LottoError::TicketNotFound(ticket_id.to_string()))?;

        if !actor.manages_shop(Some(&ticket.shop_id)) {
            if actor.user_id != ticket.user_id {
                return Err(LottoError::Forbidden("not your ticket".to_string()));
            }
            let lottery = tx
                .lottery(&ticket.lottery_id)?
                .ok_or_else(|| LottoError::LotteryNotFound(ticket.lottery_id.clone()))?;
            if !self.scheduler.is_betting_open_for(&lottery, ticket.round_date, now) {
                return Err(LottoError::LotteryClosed("round no longer accepts cancellations".to_string()));
            }
        }

        if ticket.status != TicketStatus::Pending {
            return Err(LottoError::InvalidTicketState { status: ticket.status.to_string() });
        }

        let mut ledger = LedgerGuard::new(&tx, now);
        let refunded_amount = ticket.total_amount;
        let balance = if refunded_amount > Decimal::ZERO {
            ledger
                .credit(&ticket.user_id, refunded_amount, LedgerReason::TicketRefund, &ticket.id)?
                .balance_after
        } else {
            ledger.account(&ticket.user_id)?.credit_balance
        };

        ticket.status = TicketStatus::Cancelled;
        for line in &mut ticket.lines {
            line.status = TicketStatus::Cancelled;
            line.winning_amount = Decimal::ZERO;
        }
        let stamp = format!("[Cancelled by {}]", actor.label());
        ticket.note = Some(match ticket.note.take() {
            Some(note) => format!("{} {}", note, stamp),
            None => stamp,
        });
        tx.update_ticket(&ticket)?;

        let updates = ledger.finish();
        self.store.commit(tx, updates)?;

        info!(ticket_id = %ticket.id, refunded = %refunded_amount, by = %actor.user_id, "Ticket cancelled");
        self.audit.record(AuditEvent::new(
            "ticket.cancel",
            actor,
            ticket.id.clone(),
            json!({ "refunded_amount": refunded_amount }),
            now,
        ));

        Ok(CancelReceipt { ticket_id: ticket.id, refunded_amount, balance })
    }

    // ------------------------------------------------------------------------
    // Result issuance
    // ------------------------------------------------------------------------

    /// Write the round's numbers to every lottery sharing the code (within
    /// the actor's scope) and settle all their tickets in one transaction.
    pub fn issue_result(&self, actor: &Actor, request: IssueResult) -> LottoResult<SettlementSummary> {
        require_staff(actor)?;
        let draw = WinningNumbers::parse(&request.top_3, &request.bottom_2)?;
        let now = self.now();

        let tx = self.store.begin()?;
        let anchor = tx
            .lottery(&request.lottery_id)?
            .ok_or_else(|| LottoError::LotteryNotFound(request.lottery_id.clone()))?;
        if !sees_lottery(actor, &anchor) {
            return Err(LottoError::Forbidden("lottery belongs to another shop".to_string()));
        }
        let round_date = request
            .round_date
            .unwrap_or_else(|| self.scheduler.current_round(&anchor, now));

        let mut targets: Vec<LotteryConfig> = tx
            .lotteries()?
            .into_iter()
            .filter(|l| l.code == anchor.code && !l.is_template && actor.manages_shop(l.shop_id.as_deref()))
            .collect();
        if targets.is_empty() {
            return Err(LottoError::DuplicateLotteryNotFound(anchor.code));
        }
        targets.sort_by(|a, b| a.id.cmp(&b.id));

        let mut ledger = LedgerGuard::new(&tx, now);
        let summary = SettlementEngine::new(&tx, &mut ledger, now).settle(&targets, round_date, &draw, &actor.label())?;
        let updates = ledger.finish();
        self.store.commit(tx, updates)?;

        self.audit.record(AuditEvent::new(
            "result.issue",
            actor,
            format!("{}:{}", anchor.code, round_date),
            json!({
                "top_3": draw.top_3,
                "bottom_2": draw.bottom_2,
                "lottery_ids": summary.lottery_ids,
                "tickets_processed": summary.tickets_processed,
                "total_payout": summary.total_payout,
                "revision": summary.revision,
            }),
            now,
        ));

        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // Risk administration
    // ------------------------------------------------------------------------

    pub fn add_risk(&self, actor: &Actor, request: NewRisk) -> LottoResult<NumberRisk> {
        let bet_type = normalize_bet_type(request.bet_type.as_deref());
        let mut written = self.upsert_risks(
            actor,
            &request.lottery_id,
            &[request.number],
            &bet_type,
            request.risk_type,
            None,
        )?;
        written
            .pop()
            .ok_or_else(|| LottoError::Storage("risk upsert wrote nothing".to_string()))
    }

    pub fn add_risks_batch(&self, actor: &Actor, request: BatchRisk) -> LottoResult<Vec<NumberRisk>> {
        let bet_type = normalize_bet_type(request.bet_type.as_deref());
        self.upsert_risks(actor, &request.lottery_id, &request.numbers, &bet_type, request.risk_type, request.date)
    }

    /// One directive per (shop scope, number, bet type, local day); a second
    /// write on the same day overwrites the first.
    fn upsert_risks(
        &self,
        actor: &Actor,
        lottery_id: &str,
        numbers: &[String],
        bet_type: &str,
        risk_type: RiskType,
        date: Option<NaiveDate>,
    ) -> LottoResult<Vec<NumberRisk>> {
        require_staff(actor)?;
        if numbers.is_empty() {
            return Err(LottoError::InvalidBet("no numbers given".to_string()));
        }
        let numbers: Vec<&str> = numbers.iter().map(|n| n.trim()).collect();
        for number in &numbers {
            validate_risk_number(number, bet_type)?;
        }

        let lottery = self.lottery(lottery_id)?;
        if !sees_lottery(actor, &lottery) {
            return Err(LottoError::Forbidden("lottery belongs to another shop".to_string()));
        }

        let now = self.now();
        let created_at = match date {
            Some(day) => self.scheduler.start_of_local_day(&lottery, day),
            None => now,
        };
        let day = self.scheduler.local_day(&lottery, created_at);
        let shop_id = risk_scope(actor);

        let tx = self.store.begin()?;
        let mut existing = tx.risks(&lottery.id)?;
        let mut written = Vec::with_capacity(numbers.len());
        for number in numbers {
            let current = existing.iter_mut().find(|r| {
                r.shop_id == shop_id
                    && r.number == number
                    && r.bet_type == bet_type
                    && self.scheduler.local_day(&lottery, r.created_at) == day
            });
            let risk = match current {
                Some(row) => {
                    row.risk_type = risk_type;
                    row.created_at = created_at;
                    row.clone()
                }
                None => {
                    let row = NumberRisk {
                        id: Uuid::new_v4().to_string(),
                        lottery_id: lottery.id.clone(),
                        shop_id: shop_id.clone(),
                        number: number.to_string(),
                        bet_type: bet_type.to_string(),
                        risk_type,
                        created_at,
                    };
                    existing.push(row.clone());
                    row
                }
            };
            tx.put_risk(&risk)?;
            written.push(risk);
        }
        self.store.commit(tx, Default::default())?;
        self.risk_cache.invalidate(&lottery.id);

        info!(lottery_id = %lottery.id, day = %day, count = written.len(), risk_type = risk_type.as_str(), "Risk directives written");
        self.audit.record(AuditEvent::new(
            "risk.add",
            actor,
            lottery.id.clone(),
            json!({ "day": day, "bet_type": bet_type, "risk_type": risk_type, "numbers": written.iter().map(|r| &r.number).collect::<Vec<_>>() }),
            now,
        ));

        Ok(written)
    }

    pub fn remove_risk(&self, actor: &Actor, risk_id: &str) -> LottoResult<NumberRisk> {
        require_staff(actor)?;
        let tx = self.store.begin()?;
        let risk = tx
            .risk(risk_id)?
            .ok_or_else(|| LottoError::RiskNotFound(risk_id.to_string()))?;
        if actor.role != Role::Superadmin && risk.shop_id != actor.shop_id {
            return Err(LottoError::Forbidden("risk belongs to another scope".to_string()));
        }
        tx.delete_risk(&risk)?;
        self.store.commit(tx, Default::default())?;
        self.risk_cache.invalidate(&risk.lottery_id);

        self.audit.record(AuditEvent::new(
            "risk.remove",
            actor,
            risk.id.clone(),
            json!({ "number": risk.number }),
            self.now(),
        ));
        Ok(risk)
    }

    /// Remove every directive of the actor's scope on `date` (default today)
    pub fn clear_risks(&self, actor: &Actor, lottery_id: &str, date: Option<NaiveDate>) -> LottoResult<usize> {
        require_staff(actor)?;
        let lottery = self.lottery(lottery_id)?;
        if !sees_lottery(actor, &lottery) {
            return Err(LottoError::Forbidden("lottery belongs to another shop".to_string()));
        }
        let now = self.now();
        let day = date.unwrap_or_else(|| self.scheduler.local_day(&lottery, now));

        let tx = self.store.begin()?;
        let mut removed = 0;
        for risk in tx.risks(&lottery.id)? {
            let in_scope = actor.role == Role::Superadmin || risk.shop_id == actor.shop_id;
            if in_scope && self.scheduler.local_day(&lottery, risk.created_at) == day {
                tx.delete_risk(&risk)?;
                removed += 1;
            }
        }
        self.store.commit(tx, Default::default())?;
        self.risk_cache.invalidate(&lottery.id);

        info!(lottery_id = %lottery.id, day = %day, removed = removed, "Risk directives cleared");
        self.audit.record(AuditEvent::new(
            "risk.clear",
            actor,
            lottery.id.clone(),
            json!({ "day": day, "removed": removed }),
            now,
        ));
        Ok(removed)
    }

    /// Directives visible to the actor on `date` (default today)
    pub fn list_risks(&self, actor: &Actor, lottery_id: &str, date: Option<NaiveDate>) -> LottoResult<Vec<NumberRisk>> {
        let lottery = self.lottery(lottery_id)?;
        if !sees_lottery(actor, &lottery) {
            return Err(LottoError::LotteryNotFound(lottery_id.to_string()));
        }
        let day = date.unwrap_or_else(|| self.scheduler.local_day(&lottery, self.now()));
        self.risks_on_day(actor, &lottery, day)
    }

    /// Directives of one day across every lottery the actor can see, keyed
    /// by lottery id. Without a date each lottery uses its own local today.
    pub fn list_daily_risks(
        &self,
        actor: &Actor,
        date: Option<NaiveDate>,
    ) -> LottoResult<BTreeMap<String, Vec<NumberRisk>>> {
        let now = self.now();
        let mut daily = BTreeMap::new();
        for lottery in self.store.lotteries()? {
            if lottery.is_template || !sees_lottery(actor, &lottery) {
                continue;
            }
            let day = date.unwrap_or_else(|| self.scheduler.local_day(&lottery, now));
            let rows = self.risks_on_day(actor, &lottery, day)?;
            if !rows.is_empty() {
                daily.insert(lottery.id.clone(), rows);
            }
        }
        Ok(daily)
    }

    fn risks_on_day(&self, actor: &Actor, lottery: &LotteryConfig, day: NaiveDate) -> LottoResult<Vec<NumberRisk>> {
        let mut rows: Vec<NumberRisk> = self
            .risk_rows(&lottery.id)?
            .iter()
            .filter(|r| self.scheduler.local_day(lottery, r.created_at) == day)
            .filter(|r| match (&actor.role, &actor.shop_id) {
                (Role::Superadmin, _) => true,
                (_, Some(shop)) => r.applies_to_shop(shop),
                (_, None) => r.shop_id.is_none(),
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.bet_type.cmp(&b.bet_type)));
        Ok(rows)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    fn filter_tickets(&self, mut tickets: Vec<Ticket>, filter: &TicketFilter) -> Vec<Ticket> {
        tickets.retain(|t| {
            let day = self.scheduler.default_local_day(t.created_at);
            filter.date.map_or(true, |d| day == d)
                && filter.from.map_or(true, |d| day >= d)
                && filter.to.map_or(true, |d| day <= d)
                && filter.lottery_id.as_deref().map_or(true, |id| t.lottery_id == id)
                && filter.round_date.map_or(true, |d| t.round_date == d)
                && filter.status.map_or(true, |s| t.status == s)
        });
        tickets.reverse();
        tickets.truncate(filter.limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
        tickets
    }

    /// The actor's own tickets, newest first
    pub fn ticket_history(&self, actor: &Actor, filter: &TicketFilter) -> LottoResult<Vec<Ticket>> {
        let tickets = self.store.tickets_of_user(&actor.user_id)?;
        Ok(self.filter_tickets(tickets, filter))
    }

    /// A shop's tickets, newest first (staff of that shop only)
    pub fn shop_tickets(&self, actor: &Actor, shop_id: &str, filter: &TicketFilter) -> LottoResult<Vec<Ticket>> {
        if !actor.manages_shop(Some(shop_id)) {
            return Err(LottoError::Forbidden("not staff of this shop".to_string()));
        }
        let tickets = self.store.tickets_of_shop(shop_id)?;
        Ok(self.filter_tickets(tickets, filter))
    }

    pub fn ticket(&self, actor: &Actor, ticket_id: &str) -> LottoResult<Ticket> {
        let ticket = self
            .store
            .ticket(ticket_id)?
            .ok_or_else(|| LottoError::TicketNotFound(ticket_id.to_string()))?;
        if ticket.user_id != actor.user_id && !actor.manages_shop(Some(&ticket.shop_id)) {
            return Err(LottoError::TicketNotFound(ticket_id.to_string()));
        }
        Ok(ticket)
    }

    pub fn result_history(&self, lottery_id: Option<&str>, limit: Option<usize>) -> LottoResult<Vec<RoundResult>> {
        self.store.results(lottery_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
    }

    /// Lotteries the actor can see: everything for a super-admin, otherwise
    /// active lotteries of the actor's shop plus global non-template ones.
    pub fn list_lotteries(&self, actor: &Actor) -> LottoResult<Arc<Vec<LotteryConfig>>> {
        let key = match actor.role {
            Role::Superadmin => "*".to_string(),
            _ => actor.shop_id.clone().unwrap_or_default(),
        };
        self.lottery_cache.get_or_refresh(&key, || {
            let mut lotteries: Vec<LotteryConfig> = self
                .store
                .lotteries()?
                .into_iter()
                .filter(|l| match actor.role {
                    Role::Superadmin => true,
                    _ => l.is_active && !l.is_template && sees_lottery(actor, l),
                })
                .collect();
            lotteries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            Ok(lotteries)
        })
    }

    pub fn balance_of(&self, user_id: &str) -> LottoResult<Decimal> {
        self.store
            .balance(user_id)?
            .ok_or_else(|| LottoError::AccountNotFound(user_id.to_string()))
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats { risk: self.risk_cache.stats(), lotteries: self.lottery_cache.stats() }
    }

    // ------------------------------------------------------------------------
    // Collaborator seams (CRUD lives elsewhere)
    // ------------------------------------------------------------------------

    pub fn upsert_lottery(&self, lottery: &LotteryConfig) -> LottoResult<()> {
        let tx = self.store.begin()?;
        tx.put_lottery(lottery)?;
        self.store.commit(tx, Default::default())?;
        self.lottery_cache.invalidate_all();
        Ok(())
    }

    pub fn upsert_rate_profile(&self, profile: &RateProfile) -> LottoResult<()> {
        let tx = self.store.begin()?;
        tx.put_rate_profile(profile)?;
        self.store.commit(tx, Default::default())
    }

    pub fn open_account(
        &self,
        user_id: &str,
        shop_id: Option<&str>,
        opening_balance: Decimal,
        commission_percent: Decimal,
    ) -> LottoResult<UserAccount> {
        if opening_balance < Decimal::ZERO {
            return Err(LottoError::InvalidBet("opening balance cannot be negative".to_string()));
        }
        let account = UserAccount {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            shop_id: shop_id.map(str::to_string),
            credit_balance: opening_balance,
            commission_percent,
            created_at: self.now(),
        };

        let tx = self.store.begin()?;
        let mut ledger = LedgerGuard::new(&tx, account.created_at);
        if ledger.account_exists(user_id)? {
            return Err(LottoError::AccountExists(user_id.to_string()));
        }
        ledger.open_account(&account)?;
        let updates = ledger.finish();
        self.store.commit(tx, updates)?;

        info!(user_id = %user_id, balance = %opening_balance, "Account opened");
        Ok(account)
    }
}
