//! Audit trail of state-changing operations.
//!
//! Written after the core transaction has committed, in a transaction of its
//! own. A failed audit write is logged and swallowed; it never undoes or
//! fails the operation it describes.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::LottoResult;
use crate::models::Actor;
use crate::storage::{put_json, time_key, Store, AUDIT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    /// e.g. "ticket.submit", "result.issue"
    pub action: String,
    pub actor_id: String,
    pub actor: String,
    pub shop_id: Option<String>,
    /// Ticket id, "{lottery}:{date}", risk id ...
    pub target: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: &str,
        actor: &Actor,
        target: impl Into<String>,
        detail: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            actor_id: actor.user_id.clone(),
            actor: actor.label(),
            shop_id: actor.shop_id.clone(),
            target: target.into(),
            detail,
            created_at: at,
        }
    }
}

#[derive(Clone)]
pub struct AuditTrail {
    store: Store,
}

impl AuditTrail {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Best effort: never returns an error to the caller
    pub fn record(&self, event: AuditEvent) {
        match self.write(&event) {
            Ok(()) => info!(action = %event.action, actor = %event.actor, target = %event.target, "audit"),
            Err(e) => warn!(action = %event.action, target = %event.target, error = %e, "audit write failed"),
        }
    }

    fn write(&self, event: &AuditEvent) -> LottoResult<()> {
        let txn = self.store.database().begin_write()?;
        {
            let mut table = txn.open_table(AUDIT)?;
            let key = format!("{}|{}", time_key(event.created_at), event.id);
            put_json(&mut table, &key, event)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Most recent events first
    pub fn recent(&self, limit: usize) -> LottoResult<Vec<AuditEvent>> {
        let read_txn = self.store.database().begin_read()?;
        let table = read_txn.open_table(AUDIT)?;
        let mut out = Vec::new();
        for item in table.iter()?.rev().take(limit) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(value.value())?);
        }
        Ok(out)
    }
}
