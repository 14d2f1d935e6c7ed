//! Short-TTL cache of lottery listings, keyed by shop.
//!
//! Listings are read on every page load and change rarely. A refresh runs
//! under the key's lock so a burst of requests triggers one load. When a
//! refresh fails the previous listing is served if there is one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::LottoResult;
use crate::models::LotteryConfig;

struct Listing {
    lotteries: Arc<Vec<LotteryConfig>>,
    refreshed_at: Instant,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LotteryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    /// Percentage of reads served without a load
    pub hit_rate: f64,
}

pub struct LotteryCache {
    ttl: Duration,
    listings: DashMap<String, Arc<Mutex<Option<Listing>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
}

impl LotteryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            listings: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
        }
    }

    pub fn get_or_refresh<F>(&self, key: &str, load: F) -> LottoResult<Arc<Vec<LotteryConfig>>>
    where
        F: FnOnce() -> LottoResult<Vec<LotteryConfig>>,
    {
        let slot = Arc::clone(self.listings.entry(key.to_string()).or_default().value());
        let mut listing = slot.lock();

        if let Some(current) = listing.as_ref() {
            if current.refreshed_at.elapsed() <= self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&current.lotteries));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        match load() {
            Ok(lotteries) => {
                debug!(key = %key, count = lotteries.len(), "lottery listing refreshed");
                let lotteries = Arc::new(lotteries);
                *listing = Some(Listing { lotteries: Arc::clone(&lotteries), refreshed_at: Instant::now() });
                Ok(lotteries)
            }
            Err(e) => match listing.as_ref() {
                Some(stale) => {
                    warn!(key = %key, error = %e, "lottery listing refresh failed, serving stale copy");
                    self.stale_served.fetch_add(1, Ordering::Relaxed);
                    Ok(Arc::clone(&stale.lotteries))
                }
                None => Err(e),
            },
        }
    }

    /// Drop every listing. Lottery writes can affect any shop's view.
    pub fn invalidate_all(&self) {
        self.listings.clear();
    }

    pub fn stats(&self) -> LotteryCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        LotteryCacheStats {
            hits,
            misses,
            stale_served: self.stale_served.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 * 100.0 / total as f64 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LottoError;

    fn listing(n: usize) -> Vec<LotteryConfig> {
        (0..n).map(|i| LotteryConfig::new(format!("l{}", i), "CODE", "Lotto")).collect()
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = LotteryCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_refresh("s1", || Ok(listing(2))).unwrap().len(), 2);
        assert_eq!(cache.get_or_refresh("s1", || Ok(listing(5))).unwrap().len(), 2);

        cache.invalidate_all();
        assert_eq!(cache.get_or_refresh("s1", || Ok(listing(5))).unwrap().len(), 5);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 2));
    }

    #[test]
    fn test_stale_served_on_error() {
        let cache = LotteryCache::new(Duration::ZERO);
        cache.get_or_refresh("s1", || Ok(listing(3))).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        let served = cache
            .get_or_refresh("s1", || Err(LottoError::Storage("db down".into())))
            .unwrap();
        assert_eq!(served.len(), 3);
        assert_eq!(cache.stats().stale_served, 1);

        assert!(cache.get_or_refresh("s2", || Err(LottoError::Storage("db down".into()))).is_err());
    }
}
