// ============================================================================
// LOTTOBOOK STORAGE LAYER
// ============================================================================
//
// ReDB: ACID embedded store, one write transaction = one core transaction.
// DashMap: balance cache for hot reads, updated only AFTER a commit.
//
// CONCURRENCY MODEL:
// - Reads: ReDB read transactions (MVCC snapshots), never block writers
// - Writes: ReDB admits a single writer. Everything read inside a write
//   transaction is therefore read under an exclusive lock, which is what
//   the ledger's "re-check after lock" relies on.
//
// Records are JSON blobs. Secondary indexes map composite string keys
// ("{a}|{b}|{id}") to record ids and are scanned by prefix.
//
// ============================================================================

pub mod ledger;
pub mod lottery_cache;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redb::{Database, ReadableTable, Table, TableDefinition, WriteTransaction};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::LottoResult;
use crate::models::{LedgerEntry, LotteryConfig, NumberRisk, RateProfile, RoundResult, Ticket, UserAccount};

pub use ledger::{BalanceUpdates, LedgerGuard};
pub use lottery_cache::{LotteryCache, LotteryCacheStats};

// ============================================================================
// REDB TABLE DEFINITIONS
// ============================================================================

/// user_id → UserAccount
pub(crate) const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// "{user_id}|{millis}|{entry_id}" → LedgerEntry
pub(crate) const LEDGER: TableDefinition<&str, &[u8]> = TableDefinition::new("ledger");

/// lottery_id → LotteryConfig
const LOTTERIES: TableDefinition<&str, &[u8]> = TableDefinition::new("lotteries");

/// profile_id → RateProfile
const RATE_PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("rate_profiles");

/// ticket_id → Ticket (header and lines)
const TICKETS: TableDefinition<&str, &[u8]> = TableDefinition::new("tickets");

/// "{lottery_id}|{round_date}|{ticket_id}" → ticket_id
const ROUND_TICKETS: TableDefinition<&str, &str> = TableDefinition::new("round_tickets");

/// "{user_id}|{millis}|{ticket_id}" → ticket_id
const USER_TICKETS: TableDefinition<&str, &str> = TableDefinition::new("user_tickets");

/// "{shop_id}|{millis}|{ticket_id}" → ticket_id
const SHOP_TICKETS: TableDefinition<&str, &str> = TableDefinition::new("shop_tickets");

/// "{lottery_id}|{round_date}" → RoundResult (unique per round)
const RESULTS: TableDefinition<&str, &[u8]> = TableDefinition::new("results");

/// "{lottery_id}|{risk_id}" → NumberRisk
const RISKS: TableDefinition<&str, &[u8]> = TableDefinition::new("risks");

/// risk_id → lottery_id
const RISK_IDS: TableDefinition<&str, &str> = TableDefinition::new("risk_ids");

/// "{millis}|{event_id}" → AuditEvent
pub(crate) const AUDIT: TableDefinition<&str, &[u8]> = TableDefinition::new("audit");

pub const DATABASE_FILE: &str = "lottobook.redb";

// ============================================================================
// KEY + BLOB HELPERS
// ============================================================================

pub(crate) fn time_key(at: DateTime<Utc>) -> String {
    format!("{:013}", at.timestamp_millis().max(0))
}

fn round_key(lottery_id: &str, round_date: NaiveDate) -> String {
    format!("{}|{}", lottery_id, round_date)
}

pub(crate) fn get_json<T, Tbl>(table: &Tbl, key: &str) -> LottoResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn put_json<T: Serialize>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    value: &T,
) -> LottoResult<()> {
    let bytes = serde_json::to_vec(value)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

/// Every record whose key starts with `prefix`, in key order
pub(crate) fn scan_json<T, Tbl>(table: &Tbl, prefix: &str) -> LottoResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for item in table.range(prefix..)? {
        let (key, value) = item?;
        if !key.value().starts_with(prefix) {
            break;
        }
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

/// Index values (record ids) under `prefix`, in key order
fn scan_index<Tbl>(table: &Tbl, prefix: &str) -> LottoResult<Vec<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    let mut out = Vec::new();
    for item in table.range(prefix..)? {
        let (key, value) = item?;
        if !key.value().starts_with(prefix) {
            break;
        }
        out.push(value.value().to_string());
    }
    Ok(out)
}

fn all_json<T, Tbl>(table: &Tbl) -> LottoResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for item in table.iter()? {
        let (_, value) = item?;
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

fn tickets_by_ids<Tbl>(tickets: &Tbl, ids: Vec<String>) -> LottoResult<Vec<Ticket>>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(ticket) = get_json(tickets, &id)? {
            out.push(ticket);
        }
    }
    Ok(out)
}

// ============================================================================
// STORE
// ============================================================================

/// A cached balance tagged with the write sequence that produced it
#[derive(Debug, Clone, Copy)]
struct CachedBalance {
    seq: u64,
    balance: Decimal,
}

/// Shared handle to the database. `Clone` is cheap (Arc handles).
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,

    /// user_id → credit_balance, refreshed after every committed ledger write
    balances: Arc<DashMap<String, CachedBalance>>,

    /// Last sequence handed to a writer. Assigned under the writer lock, so
    /// sequence order is commit order.
    write_seq: Arc<AtomicU64>,

    /// Highest sequence known to be committed
    committed_seq: Arc<AtomicU64>,
}

impl Store {
    /// Create or open `{dir}/lottobook.redb`
    pub fn open(dir: impl AsRef<Path>) -> LottoResult<Self> {
        let dir = dir.as_ref();
        info!(path = %dir.display(), "Opening ReDB database");
        std::fs::create_dir_all(dir)?;

        let db = Database::create(dir.join(DATABASE_FILE))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(LEDGER)?;
            let _ = write_txn.open_table(LOTTERIES)?;
            let _ = write_txn.open_table(RATE_PROFILES)?;
            let _ = write_txn.open_table(TICKETS)?;
            let _ = write_txn.open_table(ROUND_TICKETS)?;
            let _ = write_txn.open_table(USER_TICKETS)?;
            let _ = write_txn.open_table(SHOP_TICKETS)?;
            let _ = write_txn.open_table(RESULTS)?;
            let _ = write_txn.open_table(RISKS)?;
            let _ = write_txn.open_table(RISK_IDS)?;
            let _ = write_txn.open_table(AUDIT)?;
        }
        write_txn.commit()?;

        let balances = Arc::new(DashMap::new());
        {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(ACCOUNTS)?;
            for account in all_json::<UserAccount, _>(&table)? {
                balances.insert(account.user_id, CachedBalance { seq: 0, balance: account.credit_balance });
            }
        }

        info!(accounts = balances.len(), "Database loaded");
        Ok(Self {
            db: Arc::new(db),
            balances,
            write_seq: Arc::new(AtomicU64::new(0)),
            committed_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start a core transaction. Blocks while another writer is active.
    pub fn begin(&self) -> LottoResult<StoreTxn> {
        let txn = self.db.begin_write()?;
        let seq = self.write_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StoreTxn { txn, seq })
    }

    /// Commit, then publish the new balances to the cache.
    ///
    /// The writer lock is already released when publishing, so a later
    /// transaction may publish first; `publish_balance` keeps the newer one.
    pub fn commit(&self, tx: StoreTxn, balances: BalanceUpdates) -> LottoResult<()> {
        let seq = tx.seq;
        tx.txn.commit()?;
        self.committed_seq.fetch_max(seq, Ordering::SeqCst);
        for (user_id, balance) in balances {
            self.publish_balance(user_id, seq, balance);
        }
        Ok(())
    }

    /// Install `balance` unless the cache already holds a newer one
    pub(crate) fn publish_balance(&self, user_id: String, seq: u64, balance: Decimal) {
        match self.balances.entry(user_id) {
            Entry::Occupied(mut cached) => {
                if cached.get().seq <= seq {
                    cached.insert(CachedBalance { seq, balance });
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(CachedBalance { seq, balance });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads (snapshot, lock-free)
    // ------------------------------------------------------------------------

    pub fn cached_balance(&self, user_id: &str) -> Option<Decimal> {
        self.balances.get(user_id).map(|b| b.balance)
    }

    pub fn account(&self, user_id: &str) -> LottoResult<Option<UserAccount>> {
        let read_txn = self.db.begin_read()?;
        get_json(&read_txn.open_table(ACCOUNTS)?, user_id)
    }

    /// Balance from cache, falling back to the table on a miss
    pub fn balance(&self, user_id: &str) -> LottoResult<Option<Decimal>> {
        if let Some(balance) = self.cached_balance(user_id) {
            return Ok(Some(balance));
        }
        // Every sequence up to the watermark is visible to the snapshot read below
        let watermark = self.committed_seq.load(Ordering::SeqCst);
        let account = self.account(user_id)?;
        if let Some(account) = &account {
            self.publish_balance(user_id.to_string(), watermark, account.credit_balance);
        }
        Ok(account.map(|a| a.credit_balance))
    }

    pub fn ledger_entries(&self, user_id: &str) -> LottoResult<Vec<LedgerEntry>> {
        let read_txn = self.db.begin_read()?;
        scan_json(&read_txn.open_table(LEDGER)?, &format!("{}|", user_id))
    }

    pub fn lottery(&self, lottery_id: &str) -> LottoResult<Option<LotteryConfig>> {
        let read_txn = self.db.begin_read()?;
        get_json(&read_txn.open_table(LOTTERIES)?, lottery_id)
    }

    pub fn lotteries(&self) -> LottoResult<Vec<LotteryConfig>> {
        let read_txn = self.db.begin_read()?;
        all_json(&read_txn.open_table(LOTTERIES)?)
    }

    pub fn rate_profile(&self, profile_id: &str) -> LottoResult<Option<RateProfile>> {
        let read_txn = self.db.begin_read()?;
        get_json(&read_txn.open_table(RATE_PROFILES)?, profile_id)
    }

    pub fn ticket(&self, ticket_id: &str) -> LottoResult<Option<Ticket>> {
        let read_txn = self.db.begin_read()?;
        get_json(&read_txn.open_table(TICKETS)?, ticket_id)
    }

    /// Tickets of a user, oldest first
    pub fn tickets_of_user(&self, user_id: &str) -> LottoResult<Vec<Ticket>> {
        let read_txn = self.db.begin_read()?;
        let ids = scan_index(&read_txn.open_table(USER_TICKETS)?, &format!("{}|", user_id))?;
        tickets_by_ids(&read_txn.open_table(TICKETS)?, ids)
    }

    /// Tickets sold by a shop, oldest first
    pub fn tickets_of_shop(&self, shop_id: &str) -> LottoResult<Vec<Ticket>> {
        let read_txn = self.db.begin_read()?;
        let ids = scan_index(&read_txn.open_table(SHOP_TICKETS)?, &format!("{}|", shop_id))?;
        tickets_by_ids(&read_txn.open_table(TICKETS)?, ids)
    }

    pub fn round_tickets(&self, lottery_id: &str, round_date: NaiveDate) -> LottoResult<Vec<Ticket>> {
        let read_txn = self.db.begin_read()?;
        let prefix = format!("{}|", round_key(lottery_id, round_date));
        let ids = scan_index(&read_txn.open_table(ROUND_TICKETS)?, &prefix)?;
        tickets_by_ids(&read_txn.open_table(TICKETS)?, ids)
    }

    pub fn result(&self, lottery_id: &str, round_date: NaiveDate) -> LottoResult<Option<RoundResult>> {
        let read_txn = self.db.begin_read()?;
        get_json(&read_txn.open_table(RESULTS)?, &round_key(lottery_id, round_date))
    }

    /// Results, newest round first
    pub fn results(&self, lottery_id: Option<&str>, limit: usize) -> LottoResult<Vec<RoundResult>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RESULTS)?;
        let mut results: Vec<RoundResult> = match lottery_id {
            Some(id) => scan_json(&table, &format!("{}|", id))?,
            None => all_json(&table)?,
        };
        results.sort_by(|a, b| b.round_date.cmp(&a.round_date).then_with(|| a.lottery_id.cmp(&b.lottery_id)));
        results.truncate(limit);
        Ok(results)
    }

    pub fn risks(&self, lottery_id: &str) -> LottoResult<Vec<NumberRisk>> {
        let read_txn = self.db.begin_read()?;
        scan_json(&read_txn.open_table(RISKS)?, &format!("{}|", lottery_id))
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }
}

// ============================================================================
// STORE TRANSACTION
// ============================================================================

/// One open write transaction. Dropping it without `Store::commit` rolls
/// everything back.
pub struct StoreTxn {
    txn: WriteTransaction,
    seq: u64,
}

impl StoreTxn {
    pub(crate) fn raw(&self) -> &WriteTransaction {
        &self.txn
    }

    pub fn lottery(&self, lottery_id: &str) -> LottoResult<Option<LotteryConfig>> {
        get_json(&self.txn.open_table(LOTTERIES)?, lottery_id)
    }

    pub fn lotteries(&self) -> LottoResult<Vec<LotteryConfig>> {
        all_json(&self.txn.open_table(LOTTERIES)?)
    }

    pub fn put_lottery(&self, lottery: &LotteryConfig) -> LottoResult<()> {
        put_json(&mut self.txn.open_table(LOTTERIES)?, &lottery.id, lottery)
    }

    pub fn put_rate_profile(&self, profile: &RateProfile) -> LottoResult<()> {
        put_json(&mut self.txn.open_table(RATE_PROFILES)?, &profile.id, profile)
    }

    pub fn ticket(&self, ticket_id: &str) -> LottoResult<Option<Ticket>> {
        get_json(&self.txn.open_table(TICKETS)?, ticket_id)
    }

    /// Persist a new ticket and its secondary indexes
    pub fn insert_ticket(&self, ticket: &Ticket) -> LottoResult<()> {
        put_json(&mut self.txn.open_table(TICKETS)?, &ticket.id, ticket)?;

        let created = time_key(ticket.created_at);
        let round = format!("{}|{}", round_key(&ticket.lottery_id, ticket.round_date), ticket.id);
        let by_user = format!("{}|{}|{}", ticket.user_id, created, ticket.id);
        let by_shop = format!("{}|{}|{}", ticket.shop_id, created, ticket.id);

        self.txn.open_table(ROUND_TICKETS)?.insert(round.as_str(), ticket.id.as_str())?;
        self.txn.open_table(USER_TICKETS)?.insert(by_user.as_str(), ticket.id.as_str())?;
        self.txn.open_table(SHOP_TICKETS)?.insert(by_shop.as_str(), ticket.id.as_str())?;
        Ok(())
    }

    /// Overwrite an existing ticket (indexes are immutable)
    pub fn update_ticket(&self, ticket: &Ticket) -> LottoResult<()> {
        put_json(&mut self.txn.open_table(TICKETS)?, &ticket.id, ticket)
    }

    pub fn round_tickets(&self, lottery_id: &str, round_date: NaiveDate) -> LottoResult<Vec<Ticket>> {
        let prefix = format!("{}|", round_key(lottery_id, round_date));
        let ids = scan_index(&self.txn.open_table(ROUND_TICKETS)?, &prefix)?;
        tickets_by_ids(&self.txn.open_table(TICKETS)?, ids)
    }

    pub fn result(&self, lottery_id: &str, round_date: NaiveDate) -> LottoResult<Option<RoundResult>> {
        get_json(&self.txn.open_table(RESULTS)?, &round_key(lottery_id, round_date))
    }

    /// Insert or overwrite the single result row of a round
    pub fn put_result(&self, result: &RoundResult) -> LottoResult<()> {
        let key = round_key(&result.lottery_id, result.round_date);
        put_json(&mut self.txn.open_table(RESULTS)?, &key, result)
    }

    pub fn risks(&self, lottery_id: &str) -> LottoResult<Vec<NumberRisk>> {
        scan_json(&self.txn.open_table(RISKS)?, &format!("{}|", lottery_id))
    }

    pub fn put_risk(&self, risk: &NumberRisk) -> LottoResult<()> {
        let key = format!("{}|{}", risk.lottery_id, risk.id);
        put_json(&mut self.txn.open_table(RISKS)?, &key, risk)?;
        self.txn.open_table(RISK_IDS)?.insert(risk.id.as_str(), risk.lottery_id.as_str())?;
        Ok(())
    }

    pub fn risk(&self, risk_id: &str) -> LottoResult<Option<NumberRisk>> {
        let lottery_id = match self.txn.open_table(RISK_IDS)?.get(risk_id)? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };
        get_json(&self.txn.open_table(RISKS)?, &format!("{}|{}", lottery_id, risk_id))
    }

    pub fn delete_risk(&self, risk: &NumberRisk) -> LottoResult<()> {
        let key = format!("{}|{}", risk.lottery_id, risk.id);
        self.txn.open_table(RISKS)?.remove(key.as_str())?;
        self.txn.open_table(RISK_IDS)?.remove(risk.id.as_str())?;
        Ok(())
    }
}
