//! LedgerGuard: every balance change goes through here.
//!
//! A guard borrows an open write transaction, so every account it reads is
//! read under ReDB's writer lock and every change it makes commits or rolls
//! back together with the ticket/settlement rows of the same transaction.
//! Each movement is journaled as a [`LedgerEntry`] in that same transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::{get_json, put_json, time_key, StoreTxn, ACCOUNTS, LEDGER};
use crate::error::{LottoError, LottoResult};
use crate::models::{LedgerEntry, LedgerReason, UserAccount};

/// Orders journal rows written within the same millisecond
static JOURNAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Final balance per touched user, published to the cache after commit
pub type BalanceUpdates = HashMap<String, Decimal>;

pub struct LedgerGuard<'t> {
    txn: &'t WriteTransaction,
    now: DateTime<Utc>,
    updates: BalanceUpdates,
}

impl<'t> LedgerGuard<'t> {
    pub fn new(tx: &'t StoreTxn, now: DateTime<Utc>) -> Self {
        Self { txn: tx.raw(), now, updates: BalanceUpdates::new() }
    }

    /// Read an account under the writer lock
    pub fn account(&self, user_id: &str) -> LottoResult<UserAccount> {
        get_json(&self.txn.open_table(ACCOUNTS)?, user_id)?
            .ok_or_else(|| LottoError::AccountNotFound(user_id.to_string()))
    }

    pub fn account_exists(&self, user_id: &str) -> LottoResult<bool> {
        Ok(self.txn.open_table(ACCOUNTS)?.get(user_id)?.is_some())
    }

    /// Create an account with its opening balance
    pub fn open_account(&mut self, account: &UserAccount) -> LottoResult<LedgerEntry> {
        put_json(&mut self.txn.open_table(ACCOUNTS)?, &account.user_id, account)?;
        let entry = self.journal(&account.user_id, account.credit_balance, account.credit_balance, LedgerReason::Opening, "opening")?;
        self.updates.insert(account.user_id.clone(), account.credit_balance);
        Ok(entry)
    }

    /// Take `amount` from the user. The balance check happens here, after the
    /// lock, never on a value read earlier.
    pub fn debit(&mut self, user_id: &str, amount: Decimal, reason: LedgerReason, reference: &str) -> LottoResult<LedgerEntry> {
        if amount < Decimal::ZERO {
            return Err(LottoError::Storage(format!("negative debit of {} for {}", amount, user_id)));
        }
        let account = self.account(user_id)?;
        if account.credit_balance < amount {
            return Err(LottoError::InsufficientFunds { shortfall: amount - account.credit_balance });
        }
        let entry = self.write_balance(account, -amount, reason, reference)?;
        info!(user_id = %user_id, amount = %amount, balance = %entry.balance_after, reason = ?reason, "Balance debited");
        Ok(entry)
    }

    /// Unconditional increment
    pub fn credit(&mut self, user_id: &str, amount: Decimal, reason: LedgerReason, reference: &str) -> LottoResult<LedgerEntry> {
        if amount < Decimal::ZERO {
            return Err(LottoError::Storage(format!("negative credit of {} for {}", amount, user_id)));
        }
        let account = self.account(user_id)?;
        let entry = self.write_balance(account, amount, reason, reference)?;
        info!(user_id = %user_id, amount = %amount, balance = %entry.balance_after, reason = ?reason, "Balance credited");
        Ok(entry)
    }

    /// Apply a signed net delta. Zero is a no-op. The balance may go negative
    /// (a corrected result reclaiming an already spent payout).
    pub fn apply_delta(&mut self, user_id: &str, delta: Decimal, reason: LedgerReason, reference: &str) -> LottoResult<Option<LedgerEntry>> {
        if delta.is_zero() {
            return Ok(None);
        }
        let account = self.account(user_id)?;
        let entry = self.write_balance(account, delta, reason, reference)?;
        if entry.balance_after < Decimal::ZERO {
            warn!(user_id = %user_id, delta = %delta, balance = %entry.balance_after, "Balance negative after clawback");
        } else {
            info!(user_id = %user_id, delta = %delta, balance = %entry.balance_after, reason = ?reason, "Balance adjusted");
        }
        Ok(Some(entry))
    }

    /// Release the transaction borrow, handing back the balances to publish
    pub fn finish(self) -> BalanceUpdates {
        self.updates
    }

    fn write_balance(&mut self, mut account: UserAccount, delta: Decimal, reason: LedgerReason, reference: &str) -> LottoResult<LedgerEntry> {
        account.credit_balance = account
            .credit_balance
            .checked_add(delta)
            .ok_or_else(|| LottoError::InvalidBet(format!("balance of {} would overflow", account.user_id)))?;
        put_json(&mut self.txn.open_table(ACCOUNTS)?, &account.user_id, &account)?;
        let entry = self.journal(&account.user_id, delta, account.credit_balance, reason, reference)?;
        self.updates.insert(account.user_id, account.credit_balance);
        Ok(entry)
    }

    fn journal(&self, user_id: &str, delta: Decimal, balance_after: Decimal, reason: LedgerReason, reference: &str) -> LottoResult<LedgerEntry> {
        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            delta,
            balance_after,
            reason,
            reference: reference.to_string(),
            created_at: self.now,
        };
        let seq = JOURNAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}|{}|{:012}|{}", user_id, time_key(self.now), seq, entry.id);
        put_json(&mut self.txn.open_table(LEDGER)?, &key, &entry)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn account(user_id: &str, balance: Decimal) -> UserAccount {
        UserAccount {
            user_id: user_id.into(),
            username: user_id.into(),
            shop_id: Some("s1".into()),
            credit_balance: balance,
            commission_percent: dec!(0),
            created_at: Utc::now(),
        }
    }

    fn store_with(user_id: &str, balance: Decimal) -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let tx = store.begin().unwrap();
        let mut ledger = LedgerGuard::new(&tx, Utc::now());
        ledger.open_account(&account(user_id, balance)).unwrap();
        let updates = ledger.finish();
        store.commit(tx, updates).unwrap();
        (dir, store)
    }

    #[test]
    fn test_debit_rechecks_balance() {
        let (_dir, store) = store_with("u1", dec!(100));

        let tx = store.begin().unwrap();
        let mut ledger = LedgerGuard::new(&tx, Utc::now());
        let err = ledger.debit("u1", dec!(150), LedgerReason::TicketDebit, "t1").unwrap_err();
        assert_eq!(err, LottoError::InsufficientFunds { shortfall: dec!(50) });

        ledger.debit("u1", dec!(60), LedgerReason::TicketDebit, "t1").unwrap();
        let updates = ledger.finish();
        store.commit(tx, updates).unwrap();

        assert_eq!(store.balance("u1").unwrap(), Some(dec!(40)));
        let reasons: Vec<LedgerReason> = store.ledger_entries("u1").unwrap().into_iter().map(|e| e.reason).collect();
        assert_eq!(reasons, vec![LedgerReason::Opening, LedgerReason::TicketDebit]);
    }

    #[test]
    fn test_cache_untouched_without_commit() {
        let (_dir, store) = store_with("u1", dec!(100));
        {
            let tx = store.begin().unwrap();
            let mut ledger = LedgerGuard::new(&tx, Utc::now());
            ledger.credit("u1", dec!(500), LedgerReason::Settlement, "l1:2024-03-04").unwrap();
            let _ = ledger.finish();
        }
        assert_eq!(store.balance("u1").unwrap(), Some(dec!(100)));
        assert_eq!(store.account("u1").unwrap().unwrap().credit_balance, dec!(100));
    }

    #[test]
    fn test_clawback_may_go_negative() {
        let (_dir, store) = store_with("u1", dec!(10));
        let tx = store.begin().unwrap();
        let mut ledger = LedgerGuard::new(&tx, Utc::now());
        assert!(ledger.apply_delta("u1", dec!(0), LedgerReason::Settlement, "r").unwrap().is_none());
        let entry = ledger.apply_delta("u1", dec!(-50), LedgerReason::Settlement, "r").unwrap().unwrap();
        assert_eq!(entry.balance_after, dec!(-40));
    }

    #[test]
    fn test_unknown_account() {
        let (_dir, store) = store_with("u1", dec!(10));
        let tx = store.begin().unwrap();
        let mut ledger = LedgerGuard::new(&tx, Utc::now());
        assert_eq!(
            ledger.credit("ghost", dec!(1), LedgerReason::TicketRefund, "t").unwrap_err(),
            LottoError::AccountNotFound("ghost".into())
        );
    }
}
