// ============================================================================
// RISK TABLE - Suppressed and half-paid numbers for one round
// ============================================================================
//
// RiskTable is an immutable lookup built per submission. RiskCache keeps the
// raw NumberRisk rows of each lottery in memory; every risk write must call
// `invalidate` before returning so the next submission sees it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::error::LottoResult;
use crate::models::{NumberRisk, RiskType, ALL_BET_TYPES};

fn key(number: &str, bet_type: &str) -> String {
    format!("{}:{}", number, bet_type)
}

/// Effective risk directives keyed by "{number}:{bet_type}" and "{number}:ALL"
#[derive(Debug, Clone, Default)]
pub struct RiskTable {
    entries: HashMap<String, RiskType>,
}

impl RiskTable {
    /// Keep the rows that apply to `shop_id` and whose local creation day is `round`.
    ///
    /// When several rows share a key the most recent one wins.
    pub fn build<'a, I, F>(rows: I, shop_id: &str, round: NaiveDate, local_day: F) -> Self
    where
        I: IntoIterator<Item = &'a NumberRisk>,
        F: Fn(DateTime<Utc>) -> NaiveDate,
    {
        let mut applicable: Vec<&NumberRisk> = rows
            .into_iter()
            .filter(|r| r.applies_to_shop(shop_id) && local_day(r.created_at) == round)
            .collect();
        applicable.sort_by_key(|r| r.created_at);

        let mut entries = HashMap::with_capacity(applicable.len());
        for row in applicable {
            let bet_type = if row.is_wildcard() { ALL_BET_TYPES } else { row.bet_type.as_str() };
            entries.insert(key(&row.number, bet_type), row.risk_type);
        }
        Self { entries }
    }

    pub fn from_entries<'a>(items: impl IntoIterator<Item = (&'a str, &'a str, RiskType)>) -> Self {
        let entries = items
            .into_iter()
            .map(|(number, bet_type, risk)| (key(number, bet_type), risk))
            .collect();
        Self { entries }
    }

    /// Bet-type specific directive first, then the number's ALL directive
    pub fn lookup(&self, number: &str, bet_type: &str) -> Option<RiskType> {
        self.entries
            .get(&key(number, bet_type))
            .or_else(|| self.entries.get(&key(number, ALL_BET_TYPES)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// RISK CACHE
// ============================================================================

struct CachedRisks {
    rows: Arc<Vec<NumberRisk>>,
    fetched_at: Instant,
    generation: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskCacheStats {
    pub lotteries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Per-lottery cache of NumberRisk rows
pub struct RiskCache {
    ttl: Duration,
    entries: DashMap<String, CachedRisks>,
    generations: DashMap<String, u64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RiskCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            generations: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn generation(&self, lottery_id: &str) -> u64 {
        self.generations.get(lottery_id).map(|g| *g).unwrap_or(0)
    }

    /// Cached rows, or `load()` on miss/expiry.
    ///
    /// A load that raced with `invalidate` is returned to its caller but not
    /// installed, so the cache never holds rows older than the latest write.
    pub fn get_or_refresh<F>(&self, lottery_id: &str, load: F) -> LottoResult<Arc<Vec<NumberRisk>>>
    where
        F: FnOnce() -> LottoResult<Vec<NumberRisk>>,
    {
        let generation = self.generation(lottery_id);
        if let Some(cached) = self.entries.get(lottery_id) {
            if cached.generation == generation && cached.fetched_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&cached.rows));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let rows = Arc::new(load()?);

        let current = self.generations.entry(lottery_id.to_string()).or_insert(0);
        if *current == generation {
            self.entries.insert(
                lottery_id.to_string(),
                CachedRisks { rows: Arc::clone(&rows), fetched_at: Instant::now(), generation },
            );
        } else {
            debug!(lottery_id = %lottery_id, "risk refresh raced with a write, not cached");
        }
        drop(current);

        Ok(rows)
    }

    /// Drop the lottery's rows. Call after every committed risk write.
    pub fn invalidate(&self, lottery_id: &str) {
        let mut generation = self.generations.entry(lottery_id.to_string()).or_insert(0);
        *generation += 1;
        self.entries.remove(lottery_id);
        drop(generation);
        debug!(lottery_id = %lottery_id, "risk cache invalidated");
    }

    pub fn stats(&self) -> RiskCacheStats {
        RiskCacheStats {
            lotteries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
