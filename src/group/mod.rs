//! Cache Groups
//!
//! A [`Group`] is one named cache namespace: a loader, two cache tiers and
//! an optional peer picker. Every lookup runs through [`Group::get`].
//!
//! # Lookup Path
//!
//! ```text
//!   get(key)
//!     │
//!     ├──► hot tier ──── hit ──► return
//!     ├──► main tier ─── hit ──► return
//!     │
//!     ▼ miss (coalesced per key)
//!   SingleFlight::work
//!     │
//!     ├──► PeerPicker::pick_peer ──► remote owner?
//!     │        │ yes                       │ error: warn, fall through
//!     │        ▼                           │
//!     │    PeerGetter::get ──► key stats ──┼──► rate >= threshold?
//!     │                                    │        └─► hot tier
//!     ▼                                    ▼
//!   Loader::load ──► main tier ──────► return
//! ```

mod config;
mod key_stats;
mod registry;

pub use config::{
    GroupBuilder, GroupConfig, DEFAULT_CACHE_BYTES, DEFAULT_HOT_QPS_THRESHOLD, DEFAULT_HOT_TTL,
};
pub use key_stats::{KeyStats, KeyStatsTable};
pub use registry::Registry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{ByteView, ConcurrentCache, TierUsage};
use crate::domain::{Loader, PeerGetter, PeerPicker};
use crate::error::{Error, Result};
use crate::metrics::{GroupStats, StatsSnapshot};
use crate::singleflight::SingleFlight;

/// Key stats count above which stale entries are dropped
const KEY_STATS_PRUNE_LEN: usize = 4096;

/// Age after which a key that never got hot loses its stats
const KEY_STATS_MAX_AGE: Duration = Duration::from_secs(600);

/// Which of a group's two tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    /// Keys this node owns, filled by the loader
    Main,
    /// Frequently fetched remote keys
    Hot,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::Main => write!(f, "main"),
            CacheType::Hot => write!(f, "hot"),
        }
    }
}

/// A named cache namespace.
pub struct Group {
    name: String,
    config: GroupConfig,
    loader: Arc<dyn Loader>,
    main_cache: ConcurrentCache,
    hot_cache: ConcurrentCache,
    peers: OnceCell<Arc<dyn PeerPicker>>,
    loads: SingleFlight<Result<ByteView>>,
    key_stats: Mutex<KeyStatsTable>,
    stats: GroupStats,
}

impl Group {
    pub(crate) fn new(name: String, config: GroupConfig, loader: Arc<dyn Loader>) -> Self {
        let main_cache = ConcurrentCache::new(config.main_policy, config.cache_bytes);
        let hot_cache = ConcurrentCache::new(config.hot_policy, config.effective_hot_bytes());
        Self {
            name,
            config,
            loader,
            main_cache,
            hot_cache,
            peers: OnceCell::new(),
            loads: SingleFlight::new(),
            key_stats: Mutex::new(KeyStatsTable::new()),
            stats: GroupStats::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Attach the peer picker. Allowed once per group.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) -> Result<()> {
        self.peers
            .set(picker)
            .map_err(|_| Error::PeersAlreadyRegistered {
                group: self.name.clone(),
            })?;
        info!(group = %self.name, "registered peer picker");
        Ok(())
    }

    pub fn has_peers(&self) -> bool {
        self.peers.get().is_some()
    }

    /// Look up `key`, loading it from the owning peer or the loader on a miss.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        self.stats.record_get();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        if let Some((tier, value)) = self.lookup_cache(key) {
            match tier {
                CacheType::Hot => self.stats.record_hot_hit(),
                CacheType::Main => self.stats.record_main_hit(),
            }
            debug!(group = %self.name, key, %tier, "cache hit");
            return Ok(value);
        }

        self.stats.record_load();
        self.loads.work(key, || self.load(key)).await
    }

    fn lookup_cache(&self, key: &str) -> Option<(CacheType, ByteView)> {
        if let Some(value) = self.hot_cache.get(key) {
            return Some((CacheType::Hot, value));
        }
        self.main_cache.get(key).map(|value| (CacheType::Main, value))
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.stats.record_leader_load();

        // A previous leader may have filled the cache after our miss.
        // Already counted as a load, so not as a hit.
        if let Some((tier, value)) = self.lookup_cache(key) {
            debug!(group = %self.name, key, %tier, "filled by previous load");
            return Ok(value);
        }

        if let Some(peer) = self.peers.get().and_then(|p| p.pick_peer(key)) {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.stats.record_peer_error();
                    warn!(
                        group = %self.name,
                        key,
                        peer = peer.peer_id(),
                        error = %e,
                        "failed to get from peer, loading locally"
                    );
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let bytes = peer.get(&self.name, key).await?;
        self.stats.record_peer_load();
        let value = ByteView::from(bytes);
        self.record_remote_access(key, &value);
        Ok(value)
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = match self.loader.load(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.record_local_load_err();
                debug!(group = %self.name, key, error = %e, "loader failed");
                return Err(e);
            }
        };
        self.stats.record_local_load();

        let value = ByteView::from(bytes);
        self.main_cache.add(key, value.clone());
        Ok(value)
    }

    /// Count one remote fetch and promote the key when it is hot enough.
    fn record_remote_access(&self, key: &str, value: &ByteView) {
        let now = Instant::now();
        let mut table = self.key_stats.lock();
        if table.len() >= KEY_STATS_PRUNE_LEN {
            let pruned = table.prune(now, KEY_STATS_MAX_AGE);
            debug!(group = %self.name, pruned, "pruned stale key stats");
        }
        if table.record(key, now, self.config.hot_qps_threshold) {
            self.hot_cache.add(key, value.clone());
            self.stats.record_hot_promotion();
            debug!(group = %self.name, key, "promoted to hot cache");
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Entry count and byte usage of one tier
    pub fn cache_stats(&self, which: CacheType) -> TierUsage {
        match which {
            CacheType::Main => self.main_cache.usage(),
            CacheType::Hot => self.hot_cache.usage(),
        }
    }

    /// Whether `key` currently has remote access statistics
    pub fn has_key_stats(&self, key: &str) -> bool {
        self.key_stats.lock().contains(key)
    }

    /// Remote fetch count of `key` in its current hot period
    pub fn remote_hits(&self, key: &str) -> u64 {
        self.key_stats
            .lock()
            .get(key)
            .map(KeyStats::remote_hits)
            .unwrap_or(0)
    }

    /// Number of coalesced loads currently running
    pub fn loads_in_flight(&self) -> usize {
        self.loads.in_flight()
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("main_cache", &self.main_cache)
            .field("hot_cache", &self.hot_cache)
            .field("has_peers", &self.has_peers())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LoaderFn;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scores() -> HashMap<&'static str, &'static str> {
        HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
    }

    fn counting_group(threshold: u64) -> (Group, Arc<Mutex<HashMap<String, usize>>>) {
        let counts = Arc::new(Mutex::new(HashMap::new()));
        let db = scores();
        let seen = Arc::clone(&counts);
        let group = GroupBuilder::new("scores")
            .hot_qps_threshold(threshold)
            .loader(LoaderFn(move |key: &str| {
                *seen.lock().entry(key.to_string()).or_insert(0) += 1;
                db.get(key)
                    .map(|v| v.as_bytes().to_vec())
                    .ok_or_else(|| Error::not_exist(key))
            }))
            .build()
            .unwrap();
        (group, counts)
    }

    /// Always owns every key and answers with a fixed payload
    struct StaticPeer {
        payload: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PeerGetter for StaticPeer {
        async fn get(&self, _group: &str, _key: &str) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::peer("static", "connection refused"));
            }
            Ok(Bytes::from_static(self.payload.as_bytes()))
        }

        fn peer_id(&self) -> &str {
            "static"
        }
    }

    struct AlwaysRemote(Arc<StaticPeer>);

    impl PeerPicker for AlwaysRemote {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
            Some(Arc::clone(&self.0) as Arc<dyn PeerGetter>)
        }
    }

    struct NeverRemote;

    impl PeerPicker for NeverRemote {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
            None
        }
    }

    fn static_peer(payload: &'static str, fail: bool) -> Arc<StaticPeer> {
        Arc::new(StaticPeer {
            payload,
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let (group, counts) = counting_group(10);
        assert_matches!(group.get("").await, Err(Error::EmptyKey));
        assert!(counts.lock().is_empty());
        assert_eq!(group.stats().loads, 0);
    }

    #[tokio::test]
    async fn test_local_load_then_main_hit() {
        let (group, counts) = counting_group(10);

        for _ in 0..3 {
            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
        }

        assert_eq!(counts.lock()["Tom"], 1);
        let stats = group.stats();
        assert_eq!(stats.local_loads, 1);
        assert_eq!(stats.main_hits, 2);
        assert_eq!(group.cache_stats(CacheType::Main).entries, 1);
        assert_eq!(group.cache_stats(CacheType::Hot).entries, 0);
    }

    #[tokio::test]
    async fn test_load_recheck_is_not_a_hit() {
        let (group, counts) = counting_group(10);
        group.get("Tom").await.unwrap();

        // a leader that lost the race to a previous load
        assert_eq!(group.load("Tom").await.unwrap().to_string(), "630");

        assert_eq!(counts.lock()["Tom"], 1);
        let stats = group.stats();
        assert_eq!(stats.leader_loads, 2);
        assert_eq!(stats.main_hits, 0);
        assert_eq!(stats.hot_hits, 0);
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let (group, counts) = counting_group(10);

        let err = group.get("unknown").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown not exist");
        assert!(group.get("unknown").await.is_err());

        assert_eq!(counts.lock()["unknown"], 2);
        assert_eq!(group.stats().local_load_errs, 2);
        assert_eq!(group.cache_stats(CacheType::Main).entries, 0);
    }

    #[tokio::test]
    async fn test_register_peers_once() {
        let (group, _) = counting_group(10);
        assert!(!group.has_peers());
        group.register_peers(Arc::new(NeverRemote)).unwrap();
        assert!(group.has_peers());

        let err = group.register_peers(Arc::new(NeverRemote)).unwrap_err();
        assert_matches!(err, Error::PeersAlreadyRegistered { group } if group == "scores");
    }

    #[tokio::test]
    async fn test_self_owned_keys_load_locally() {
        let (group, counts) = counting_group(10);
        group.register_peers(Arc::new(NeverRemote)).unwrap();

        assert_eq!(group.get("Jack").await.unwrap().to_string(), "589");
        assert_eq!(counts.lock()["Jack"], 1);
        assert_eq!(group.stats().peer_loads, 0);
    }

    #[tokio::test]
    async fn test_remote_values_are_not_stored_in_main() {
        let (group, counts) = counting_group(100);
        let peer = static_peer("remote", false);
        group
            .register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))))
            .unwrap();

        assert_eq!(group.get("Tom").await.unwrap().to_string(), "remote");
        assert_eq!(group.get("Tom").await.unwrap().to_string(), "remote");

        assert_eq!(peer.calls.load(Ordering::SeqCst), 2);
        assert!(counts.lock().is_empty());
        assert_eq!(group.cache_stats(CacheType::Main).entries, 0);
        assert_eq!(group.remote_hits("Tom"), 2);
    }

    #[tokio::test]
    async fn test_hot_promotion_at_threshold() {
        let (group, _) = counting_group(3);
        let peer = static_peer("remote", false);
        group
            .register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))))
            .unwrap();

        for _ in 0..2 {
            group.get("Tom").await.unwrap();
        }
        assert!(group.has_key_stats("Tom"));
        assert_eq!(group.cache_stats(CacheType::Hot).entries, 0);

        group.get("Tom").await.unwrap();
        assert!(!group.has_key_stats("Tom"));
        assert_eq!(group.cache_stats(CacheType::Hot).entries, 1);
        assert_eq!(group.stats().hot_promotions, 1);

        // now served without touching the peer
        assert_eq!(group.get("Tom").await.unwrap().to_string(), "remote");
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(group.stats().hot_hits, 1);
    }

    #[tokio::test]
    async fn test_peer_failure_falls_back_to_loader() {
        let (group, counts) = counting_group(10);
        let peer = static_peer("unused", true);
        group
            .register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))))
            .unwrap();

        assert_eq!(group.get("Sam").await.unwrap().to_string(), "567");
        assert_eq!(counts.lock()["Sam"], 1);
        assert_eq!(group.stats().peer_errors, 1);
        assert!(!group.has_key_stats("Sam"));
        assert_eq!(group.cache_stats(CacheType::Main).entries, 1);
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));

        struct SlowLoader(Arc<AtomicUsize>);

        #[async_trait]
        impl Loader for SlowLoader {
            async fn load(&self, key: &str) -> Result<Vec<u8>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(format!("value-{}", key).into_bytes())
            }
        }

        let group = Arc::new(
            GroupBuilder::new("slow")
                .loader(SlowLoader(Arc::clone(&calls)))
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let group = Arc::clone(&group);
                tokio::spawn(async move { group.get("k").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().to_string(), "value-k");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.loads_in_flight(), 0);
    }

    #[test]
    fn test_cache_type_display() {
        assert_eq!(CacheType::Main.to_string(), "main");
        assert_eq!(CacheType::Hot.to_string(), "hot");
    }
}
