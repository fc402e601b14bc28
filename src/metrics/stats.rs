//! Group Statistics
//!
//! Lock-free counters describing how each `get` was served.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-group counters
#[derive(Debug, Default)]
pub struct GroupStats {
    /// All `get` calls, including rejected ones
    gets: AtomicU64,
    /// Served from the hot tier
    hot_hits: AtomicU64,
    /// Served from the main tier
    main_hits: AtomicU64,
    /// Misses that entered the coalesced load path
    loads: AtomicU64,
    /// Coalesced loads run by a leader (one per batch), including
    /// those answered by the cache re-check
    leader_loads: AtomicU64,
    /// Successful remote fetches
    peer_loads: AtomicU64,
    /// Failed remote fetches (fell back to the loader)
    peer_errors: AtomicU64,
    /// Successful loader calls
    local_loads: AtomicU64,
    /// Failed loader calls
    local_load_errs: AtomicU64,
    /// Keys copied into the hot tier
    hot_promotions: AtomicU64,
}

impl GroupStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hot_hit(&self) {
        self.hot_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_main_hit(&self) {
        self.main_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leader_load(&self) {
        self.leader_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_load(&self) {
        self.peer_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_error(&self) {
        self.peer_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load(&self) {
        self.local_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load_err(&self) {
        self.local_load_errs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hot_promotion(&self) {
        self.hot_promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Hit ratio across both tiers
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.hot_hits.load(Ordering::Relaxed)
            + self.main_hits.load(Ordering::Relaxed)) as f64;
        let total = hits + self.loads.load(Ordering::Relaxed) as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            main_hits: self.main_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            leader_loads: self.leader_loads.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errs: self.local_load_errs.load(Ordering::Relaxed),
            hot_promotions: self.hot_promotions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GroupStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub gets: u64,
    pub hot_hits: u64,
    pub main_hits: u64,
    pub loads: u64,
    pub leader_loads: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub hot_promotions: u64,
}

impl StatsSnapshot {
    /// `(name, value)` pairs in a stable order
    pub fn counters(&self) -> [(&'static str, u64); 10] {
        [
            ("gets", self.gets),
            ("hot_hits", self.hot_hits),
            ("main_hits", self.main_hits),
            ("loads", self.loads),
            ("leader_loads", self.leader_loads),
            ("peer_loads", self.peer_loads),
            ("peer_errors", self.peer_errors),
            ("local_loads", self.local_loads),
            ("local_load_errs", self.local_load_errs),
            ("hot_promotions", self.hot_promotions),
        ]
    }
}
