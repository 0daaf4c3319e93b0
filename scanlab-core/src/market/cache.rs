//! Shared TTL cache for market-structure series.
//!
//! The only shared mutable resource in a scan: many readers, last writer wins.

use super::MarketSeries;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    series: Arc<MarketSeries>,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct MarketCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MarketCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<MarketSeries>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.series))
    }

    pub fn insert(&self, key: impl Into<String>, series: MarketSeries) -> Arc<MarketSeries> {
        let series = Arc::new(series);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.into(),
            CacheEntry {
                series: Arc::clone(&series),
                stored_at: Instant::now(),
            },
        );
        series
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketPoint;

    fn series(oi: f64) -> MarketSeries {
        MarketSeries {
            points: vec![MarketPoint {
                time: 1,
                open_interest: oi,
                funding_rate: None,
                long_short_ratio: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn get_returns_fresh_entries() {
        let cache = MarketCache::new(Duration::from_secs(60));
        assert!(cache.get("BTCUSDT").is_none());
        cache.insert("BTCUSDT", series(10.0));
        assert_eq!(cache.get("BTCUSDT").unwrap().points[0].open_interest, 10.0);
    }

    #[test]
    fn last_writer_wins() {
        let cache = MarketCache::new(Duration::from_secs(60));
        cache.insert("ETHUSDT", series(1.0));
        cache.insert("ETHUSDT", series(2.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("ETHUSDT").unwrap().points[0].open_interest, 2.0);
    }

    #[test]
    fn expired_entries_are_invisible_and_purged() {
        let cache = MarketCache::new(Duration::from_millis(5));
        cache.insert("SOLUSDT", series(1.0));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("SOLUSDT").is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let cache = Arc::new(MarketCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.insert(format!("S{}", i % 2), series(i as f64));
                    cache.get("S0").is_some() || cache.get("S1").is_some()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(cache.len(), 2);
    }
}
