//! LFU Eviction Store
//!
//! Frequency-ordered store with per-entry expiry.
//!
//! Entries live in an indexed binary min-heap keyed on access frequency; the
//! key index records each entry's heap position so a hit can re-heapify the
//! touched entry in O(log n). Ties between equal frequencies are broken by
//! heap position, which is not a stable insertion order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::store::{entry_bytes, EvictionStore, OnEvicted, Value};

struct Entry<V> {
    key: String,
    value: V,
    /// Access count
    frequency: u64,
    /// Absolute expiry (None = never)
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Least-frequently-used store bounded by total bytes.
pub struct LfuStore<V> {
    max_bytes: u64,
    used_bytes: u64,
    /// Min-heap on `frequency`
    heap: Vec<Entry<V>>,
    /// Key -> heap position
    index: HashMap<String, usize>,
    on_evicted: Option<OnEvicted<V>>,
    /// TTL applied by [`EvictionStore::add`]
    default_ttl: Option<Duration>,
}

impl<V: Value> LfuStore<V> {
    /// Create an empty store.
    pub fn new(
        max_bytes: u64,
        on_evicted: Option<OnEvicted<V>>,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            heap: Vec::new(),
            index: HashMap::new(),
            on_evicted,
            default_ttl,
        }
    }

    /// Insert or replace `key` with an explicit TTL (`None` = never expires).
    pub fn add_with_ttl(&mut self, key: &str, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);

        if let Some(&pos) = self.index.get(key) {
            let entry = &mut self.heap[pos];
            let old_len = entry.value.byte_len() as u64;
            let new_len = value.byte_len() as u64;
            entry.frequency += 1;
            entry.value = value;
            entry.expires_at = expires_at;
            self.used_bytes = self.used_bytes - old_len + new_len;
            self.fix(pos);
        } else {
            self.used_bytes += entry_bytes(key, &value);
            let pos = self.heap.len();
            self.heap.push(Entry {
                key: key.to_string(),
                value,
                frequency: 1,
                expires_at,
            });
            self.index.insert(key.to_string(), pos);
            self.sift_up(pos);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            if !self.remove_least_frequent() {
                break;
            }
        }
    }

    /// Evict the minimum-frequency entry. Returns `false` when empty.
    pub fn remove_least_frequent(&mut self) -> bool {
        if self.heap.is_empty() {
            return false;
        }
        let entry = self.remove_at(0);
        self.notify(&entry);
        true
    }

    /// Access count recorded for `key`, without touching it.
    pub fn frequency(&self, key: &str) -> Option<u64> {
        self.index.get(key).map(|&pos| self.heap[pos].frequency)
    }

    fn notify(&mut self, entry: &Entry<V>) {
        if let Some(cb) = self.on_evicted.as_mut() {
            cb(&entry.key, &entry.value);
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        if let Some(p) = self.index.get_mut(&self.heap[a].key) {
            *p = a;
        }
        if let Some(p) = self.index.get_mut(&self.heap[b].key) {
            *p = b;
        }
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].frequency >= self.heap[parent].frequency {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) -> usize {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left].frequency < self.heap[smallest].frequency {
                smallest = left;
            }
            if right < len && self.heap[right].frequency < self.heap[smallest].frequency {
                smallest = right;
            }
            if smallest == pos {
                return pos;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    /// Restore heap order around `pos`, returning the entry's new position.
    fn fix(&mut self, pos: usize) -> usize {
        let pos = self.sift_up(pos);
        self.sift_down(pos)
    }

    fn remove_at(&mut self, pos: usize) -> Entry<V> {
        let last = self.heap.len() - 1;
        if pos != last {
            self.swap(pos, last);
        }
        let entry = self.heap.remove(last);
        self.index.remove(&entry.key);
        if pos < self.heap.len() {
            self.fix(pos);
        }
        self.used_bytes -= entry_bytes(&entry.key, &entry.value);
        entry
    }
}

impl<V: Value + Send> EvictionStore<V> for LfuStore<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        let pos = *self.index.get(key)?;

        if self.heap[pos].is_expired(Instant::now()) {
            let entry = self.remove_at(pos);
            tracing::warn!(key = %entry.key, "lfu entry expired");
            self.notify(&entry);
            return None;
        }

        self.heap[pos].frequency += 1;
        let pos = self.fix(pos);
        Some(&self.heap[pos].value)
    }

    fn add(&mut self, key: &str, value: V) {
        self.add_with_ttl(key, value, self.default_ttl);
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        let pos = *self.index.get(key)?;
        Some(self.remove_at(pos).value)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn assert_heap_order<V>(store: &LfuStore<V>) {
        for (pos, entry) in store.heap.iter().enumerate() {
            assert_eq!(store.index[&entry.key], pos, "index out of sync");
            if pos > 0 {
                let parent = (pos - 1) / 2;
                assert!(store.heap[parent].frequency <= entry.frequency);
            }
        }
    }

    #[test]
    fn test_get_hit_and_miss() {
        let mut lfu: LfuStore<&'static str> = LfuStore::new(0, None, Some(Duration::from_secs(60)));
        lfu.add("key1", "1234");

        assert_eq!(lfu.get("key1").copied(), Some("1234"));
        assert!(lfu.get("key2").is_none());
    }

    #[test]
    fn test_ttl_expiry_evicts_on_read() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let callback: OnEvicted<String> = Box::new(move |key, _| {
            sink.lock().unwrap().push(key.to_string());
        });

        let mut lfu = LfuStore::new(0, Some(callback), None);
        lfu.add_with_ttl("session", "abc".to_string(), Some(Duration::from_millis(50)));
        assert_eq!(lfu.get("session").map(String::as_str), Some("abc"));

        std::thread::sleep(Duration::from_millis(80));

        assert!(lfu.get("session").is_none());
        assert_eq!(lfu.len(), 0);
        assert_eq!(lfu.used_bytes(), 0);
        assert_eq!(*evicted.lock().unwrap(), vec!["session"]);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let mut lfu: LfuStore<String> = LfuStore::new(0, None, None);
        lfu.add("k", "v".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert!(lfu.get("k").is_some());
    }

    #[test]
    fn test_evicts_least_frequent() {
        // each entry costs 2 bytes, capacity holds three
        let mut lfu: LfuStore<&'static str> = LfuStore::new(6, None, None);
        lfu.add("a", "1");
        lfu.add("b", "2");
        lfu.add("c", "3");

        lfu.get("a");
        lfu.get("a");
        lfu.get("b");
        assert_eq!(lfu.frequency("a"), Some(3));
        assert_eq!(lfu.frequency("b"), Some(2));
        assert_heap_order(&lfu);

        lfu.add("d", "4");

        assert_eq!(lfu.len(), 3);
        assert!(lfu.get("a").is_some());
        assert!(lfu.get("b").is_some());
        // "c" and "d" tie at frequency 1; exactly one of them survives
        let survivors = ["c", "d"].iter().filter(|k| lfu.index.contains_key(**k)).count();
        assert_eq!(survivors, 1);
    }

    #[test]
    fn test_update_bumps_frequency_and_accounting() {
        let mut lfu: LfuStore<String> = LfuStore::new(0, None, None);
        lfu.add("key", "1234".to_string());
        lfu.add("key", "12".to_string());

        assert_eq!(lfu.frequency("key"), Some(2));
        assert_eq!(lfu.used_bytes(), 5);
        assert_eq!(lfu.len(), 1);
    }

    #[test]
    fn test_update_refreshes_expiry() {
        let mut lfu: LfuStore<String> = LfuStore::new(0, None, None);
        lfu.add_with_ttl("k", "old".to_string(), Some(Duration::from_millis(20)));
        lfu.add_with_ttl("k", "new".to_string(), None);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(lfu.get("k").map(String::as_str), Some("new"));
    }

    #[test]
    fn test_heap_stays_consistent_under_churn() {
        let mut lfu: LfuStore<Vec<u8>> = LfuStore::new(64, None, None);
        for round in 0..50u8 {
            let key = format!("k{}", round % 13);
            lfu.add(&key, vec![round; (round % 5) as usize]);
            if round % 3 == 0 {
                lfu.get(&format!("k{}", round % 7));
            }
            if round % 11 == 0 {
                lfu.remove(&format!("k{}", round % 4));
            }
            assert_heap_order(&lfu);
            assert!(lfu.used_bytes() <= 64);
        }
    }
}
