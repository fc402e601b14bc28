//! Remote access statistics for hot-tier promotion

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Remote fetch history of one key.
#[derive(Debug, Clone, Copy)]
pub struct KeyStats {
    /// First remote fetch in the current hot period
    first_seen: Instant,
    /// Remote fetches since `first_seen`
    remote_hits: u64,
}

impl KeyStats {
    fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            remote_hits: 0,
        }
    }

    pub fn remote_hits(&self) -> u64 {
        self.remote_hits
    }

    /// Fetches per minute: `hits / max(1, round(minutes since first seen))`
    pub fn rate_per_minute(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.first_seen);
        let minutes = (elapsed.as_secs_f64() / 60.0).round().max(1.0);
        self.remote_hits as f64 / minutes
    }
}

/// Statistics map for every key fetched from a peer.
///
/// Not synchronised; the owning group holds it behind one mutex so that
/// counting, the threshold check and removal happen atomically.
#[derive(Debug, Default)]
pub struct KeyStatsTable {
    keys: HashMap<String, KeyStats>,
}

impl KeyStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one remote fetch of `key` at `now`. Returns `true` (and forgets
    /// the key) when its rate reaches `threshold`.
    pub fn record(&mut self, key: &str, now: Instant, threshold: u64) -> bool {
        let stats = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| KeyStats::new(now));
        stats.remote_hits += 1;

        if stats.rate_per_minute(now) >= threshold as f64 {
            self.keys.remove(key);
            return true;
        }
        false
    }

    pub fn get(&self, key: &str) -> Option<&KeyStats> {
        self.keys.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop entries whose first fetch is older than `max_age`.
    pub fn prune(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.keys.len();
        self.keys
            .retain(|_, s| now.saturating_duration_since(s.first_seen) <= max_age);
        before - self.keys.len()
    }
}
