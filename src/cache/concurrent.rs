//! Thread-safe cache tier
//!
//! Wraps one [`EvictionStore`] behind a single mutex. The store is built on
//! first insert, so an unused tier costs nothing.

use parking_lot::Mutex;

use super::byteview::ByteView;
use super::store::{EvictionPolicy, EvictionStore};

/// Entry count and byte usage of one tier at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierUsage {
    pub entries: usize,
    pub used_bytes: u64,
    pub max_bytes: u64,
}

/// Mutex-guarded, lazily initialised store of [`ByteView`]s.
pub struct ConcurrentCache {
    policy: EvictionPolicy,
    max_bytes: u64,
    store: Mutex<Option<Box<dyn EvictionStore<ByteView>>>>,
}

impl ConcurrentCache {
    /// Create an empty tier. No store is allocated until the first `add`.
    pub fn new(policy: EvictionPolicy, max_bytes: u64) -> Self {
        Self {
            policy,
            max_bytes,
            store: Mutex::new(None),
        }
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut guard = self.store.lock();
        guard.as_mut()?.get(key).cloned()
    }

    /// Insert `value` under `key`, building the store on first use.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut guard = self.store.lock();
        guard
            .get_or_insert_with(|| self.policy.build(self.max_bytes, None))
            .add(key, value);
    }

    /// Remove `key` if present.
    pub fn remove(&self, key: &str) -> Option<ByteView> {
        let mut guard = self.store.lock();
        guard.as_mut()?.remove(key)
    }

    /// Whether the backing store has been built yet
    pub fn is_initialized(&self) -> bool {
        self.store.lock().is_some()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Current usage
    pub fn usage(&self) -> TierUsage {
        let guard = self.store.lock();
        match guard.as_ref() {
            Some(store) => TierUsage {
                entries: store.len(),
                used_bytes: store.used_bytes(),
                max_bytes: store.max_bytes(),
            },
            None => TierUsage {
                max_bytes: self.max_bytes,
                ..TierUsage::default()
            },
        }
    }
}

impl std::fmt::Debug for ConcurrentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentCache")
            .field("policy", &self.policy)
            .field("usage", &self.usage())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lazy_initialization() {
        let cache = ConcurrentCache::new(EvictionPolicy::Lru, 1024);
        assert!(!cache.is_initialized());
        assert!(cache.get("missing").is_none());
        assert!(!cache.is_initialized());

        cache.add("key", ByteView::from("value"));
        assert!(cache.is_initialized());
        assert_eq!(cache.get("key").unwrap().to_string(), "value");
    }

    #[test]
    fn test_usage_reporting() {
        let cache = ConcurrentCache::new(EvictionPolicy::Lfu { ttl: None }, 64);
        assert_eq!(
            cache.usage(),
            TierUsage {
                entries: 0,
                used_bytes: 0,
                max_bytes: 64
            }
        );

        cache.add("ab", ByteView::from("1234"));
        let usage = cache.usage();
        assert_eq!(usage.entries, 1);
        assert_eq!(usage.used_bytes, 6);
    }

    #[test]
    fn test_expiring_tier() {
        let cache = ConcurrentCache::new(
            EvictionPolicy::Lfu {
                ttl: Some(Duration::from_millis(30)),
            },
            0,
        );
        cache.add("hot", ByteView::from("v"));
        assert!(cache.get("hot").is_some());

        thread::sleep(Duration::from_millis(50));
        assert!(cache.get("hot").is_none());
        assert_eq!(cache.usage().entries, 0);
    }

    #[test]
    fn test_remove() {
        let cache = ConcurrentCache::new(EvictionPolicy::Lru, 0);
        assert!(cache.remove("k").is_none());
        cache.add("k", ByteView::from("v"));
        assert_eq!(cache.remove("k").unwrap().to_string(), "v");
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ConcurrentCache::new(EvictionPolicy::Lru, 0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("key-{}-{}", t, i);
                        cache.add(&key, ByteView::from(vec![t as u8; 4]));
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.usage().entries, 4000);
    }
}
