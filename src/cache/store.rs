//! Eviction store contract shared by the LRU and LFU policies.

use std::time::Duration;

use super::lfu::LfuStore;
use super::lru::LruStore;

/// Anything that can report how many bytes it occupies.
pub trait Value {
    /// Size in bytes counted against a store's capacity
    fn byte_len(&self) -> usize;
}

impl Value for String {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Value for &'static str {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Value for Vec<u8> {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Value for bytes::Bytes {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

/// Callback fired with every entry removed by capacity pressure or expiry.
pub type OnEvicted<V> = Box<dyn FnMut(&str, &V) + Send>;

/// Bytes charged for one entry.
#[inline]
pub(crate) fn entry_bytes<V: Value>(key: &str, value: &V) -> u64 {
    (key.len() + value.byte_len()) as u64
}

/// Capacity-bounded key-value store.
///
/// `max_bytes == 0` means unbounded. Otherwise `used_bytes() <= max_bytes()`
/// holds after every `add`.
pub trait EvictionStore<V: Value>: Send {
    /// Look up `key`, updating the policy's bookkeeping on a hit.
    fn get(&mut self, key: &str) -> Option<&V>;

    /// Insert or replace `key`, evicting until back within capacity.
    fn add(&mut self, key: &str, value: V);

    /// Remove `key` without firing the eviction callback.
    fn remove(&mut self, key: &str) -> Option<V>;

    /// Number of entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently charged (`key.len() + value.byte_len()` per entry)
    fn used_bytes(&self) -> u64;

    /// Capacity in bytes (0 = unbounded)
    fn max_bytes(&self) -> u64;
}

/// Which eviction policy backs a cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Least frequently used, entries expire after `ttl` (`None` = never)
    Lfu { ttl: Option<Duration> },
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::Lru
    }
}

impl EvictionPolicy {
    /// Short policy name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Lfu { .. } => "LFU",
        }
    }

    /// Build an empty store for this policy.
    pub fn build<V>(
        &self,
        max_bytes: u64,
        on_evicted: Option<OnEvicted<V>>,
    ) -> Box<dyn EvictionStore<V>>
    where
        V: Value + Send + 'static,
    {
        match *self {
            EvictionPolicy::Lru => Box::new(LruStore::new(max_bytes, on_evicted)),
            EvictionPolicy::Lfu { ttl } => Box::new(LfuStore::new(max_bytes, on_evicted, ttl)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_entry_bytes_formula() {
        assert_eq!(entry_bytes("key1", &"123456"), 10);
        assert_eq!(entry_bytes("", &String::new()), 0);
    }

    #[test]
    fn test_policy_builds_matching_store() {
        let mut lru = EvictionPolicy::Lru.build::<String>(0, None);
        lru.add("a", "1".to_string());
        assert_eq!(lru.get("a").map(String::as_str), Some("1"));

        let mut lfu = EvictionPolicy::Lfu { ttl: None }.build::<String>(0, None);
        lfu.add("a", "1".to_string());
        assert_eq!(lfu.get("a").map(String::as_str), Some("1"));

        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Lru);
        assert_eq!(EvictionPolicy::Lfu { ttl: None }.name(), "LFU");
    }

    fn ops_strategy() -> impl Strategy<Value = Vec<(u8, usize)>> {
        prop::collection::vec((0u8..32, 0usize..24), 1..200)
    }

    fn check_capacity(policy: EvictionPolicy, max_bytes: u64, ops: &[(u8, usize)]) {
        let mut store = policy.build::<Vec<u8>>(max_bytes, None);
        for (k, size) in ops {
            let key = format!("k{}", k);
            store.add(&key, vec![0u8; *size]);
            assert!(
                store.used_bytes() <= max_bytes,
                "{} used {} > max {}",
                policy.name(),
                store.used_bytes(),
                max_bytes
            );
            // every GET keeps accounting consistent too
            let _ = store.get(&key);
            assert!(store.used_bytes() <= max_bytes);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_lru_used_bytes_within_capacity(max_bytes in 1u64..128, ops in ops_strategy()) {
            check_capacity(EvictionPolicy::Lru, max_bytes, &ops);
        }

        #[test]
        fn prop_lfu_used_bytes_within_capacity(max_bytes in 1u64..128, ops in ops_strategy()) {
            check_capacity(EvictionPolicy::Lfu { ttl: None }, max_bytes, &ops);
        }

        #[test]
        fn prop_unbounded_never_evicts(ops in ops_strategy()) {
            let mut store = EvictionPolicy::Lru.build::<Vec<u8>>(0, None);
            let mut keys = std::collections::HashSet::new();
            for (k, size) in &ops {
                let key = format!("k{}", k);
                store.add(&key, vec![0u8; *size]);
                keys.insert(key);
            }
            prop_assert_eq!(store.len(), keys.len());
        }
    }
}
