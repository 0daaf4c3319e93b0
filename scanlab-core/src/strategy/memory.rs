//! Caller-owned breakout memory.
//!
//! Trendlines are recomputed from scratch on every call, which loses a
//! breakout the current window no longer shows (a marginal cross can flip
//! once RSI is re-seeded on a shifted window). The memory keeps "breakout
//! seen at time T" for a line, identified by the open times of its anchor
//! pivots, for a bounded number of candles.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakoutKey {
    pub symbol: String,
    pub pivot_1_time: i64,
    pub pivot_2_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    breakout_time: i64,
    expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct BreakoutMemory {
    entries: HashMap<BreakoutKey, Entry>,
    capacity: usize,
}

impl BreakoutMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember a breakout that stays valid until `expires_at` (epoch ms).
    /// At capacity, the entry closest to expiry is evicted.
    pub fn record(&mut self, key: BreakoutKey, breakout_time: i64, expires_at: i64) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            Entry {
                breakout_time,
                expires_at,
            },
        );
    }

    /// Breakout time for `key` if still valid at `now`.
    pub fn recall(&self, key: &BreakoutKey, now: i64) -> Option<i64> {
        self.entries
            .get(key)
            .filter(|e| now <= e.expires_at)
            .map(|e| e.breakout_time)
    }

    pub fn forget(&mut self, key: &BreakoutKey) {
        self.entries.remove(key);
    }

    /// Drop entries expired at `now`.
    pub fn prune(&mut self, now: i64) {
        self.entries.retain(|_, e| now <= e.expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BreakoutMemory {
    fn default() -> Self {
        Self::new(1024)
    }
}
