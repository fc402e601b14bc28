//! LRU Eviction Store
//!
//! Recency-ordered store backed by an index-linked doubly linked list.
//!
//! # Design
//!
//! ```text
//!   index: HashMap<String, usize>      nodes: Vec<Option<Node<V>>>
//!
//!   head (MRU) ─► [3] ◄──► [0] ◄──► [2] ◄── tail (LRU)
//! ```
//!
//! - `get` / `add` move the touched node to the head: O(1)
//! - eviction pops from the tail: O(1)
//! - freed slots are recycled through a free list, so node indices stay stable

use std::collections::HashMap;

use super::store::{entry_bytes, EvictionStore, OnEvicted, Value};

struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Least-recently-used store bounded by total bytes.
pub struct LruStore<V> {
    /// Capacity in bytes (0 = unbounded)
    max_bytes: u64,
    /// Bytes currently charged
    used_bytes: u64,
    /// Slot arena for list nodes
    nodes: Vec<Option<Node<V>>>,
    /// Recycled slot indices
    free: Vec<usize>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    index: HashMap<String, usize>,
    on_evicted: Option<OnEvicted<V>>,
}

impl<V: Value> LruStore<V> {
    /// Create an empty store.
    pub fn new(max_bytes: u64, on_evicted: Option<OnEvicted<V>>) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            index: HashMap::new(),
            on_evicted,
        }
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(node) = cursor.and_then(|idx| self.slot(idx)) {
            keys.push(node.key.as_str());
            cursor = node.next;
        }
        keys
    }

    /// Evict the least recently used entry. Returns `false` when empty.
    pub fn remove_oldest(&mut self) -> bool {
        let Some(idx) = self.tail else {
            return false;
        };
        let Some(node) = self.release(idx) else {
            return false;
        };
        if let Some(cb) = self.on_evicted.as_mut() {
            cb(&node.key, &node.value);
        }
        true
    }

    #[inline]
    fn slot(&self, idx: usize) -> Option<&Node<V>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    #[inline]
    fn slot_mut(&mut self, idx: usize) -> Option<&mut Node<V>> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.slot(idx).map(|n| (n.prev, n.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(n) = self.slot_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.slot_mut(nx) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(n) = self.slot_mut(idx) {
            n.prev = None;
            n.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(n) = self.slot_mut(idx) {
            n.prev = None;
            n.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(n) = self.slot_mut(h) {
                    n.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn alloc(&mut self, node: Node<V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Unlink `idx`, free its slot and drop it from the index and accounting.
    fn release(&mut self, idx: usize) -> Option<Node<V>> {
        self.detach(idx);
        let node = self.nodes.get_mut(idx).and_then(Option::take)?;
        self.free.push(idx);
        self.index.remove(&node.key);
        self.used_bytes -= entry_bytes(&node.key, &node.value);
        Some(node)
    }

    fn enforce_capacity(&mut self) {
        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            if !self.remove_oldest() {
                break;
            }
        }
    }
}

impl<V: Value + Send> EvictionStore<V> for LruStore<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.detach(idx);
        self.attach_front(idx);
        self.slot(idx).map(|n| &n.value)
    }

    fn add(&mut self, key: &str, value: V) {
        if let Some(&idx) = self.index.get(key) {
            let new_len = value.byte_len() as u64;
            if let Some(node) = self.slot_mut(idx) {
                let old_len = node.value.byte_len() as u64;
                node.value = value;
                self.used_bytes = self.used_bytes - old_len + new_len;
            }
            self.detach(idx);
            self.attach_front(idx);
        } else {
            self.used_bytes += entry_bytes(key, &value);
            let idx = self.alloc(Node {
                key: key.to_string(),
                value,
                prev: None,
                next: None,
            });
            self.index.insert(key.to_string(), idx);
            self.attach_front(idx);
        }

        self.enforce_capacity();
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.release(idx).map(|n| n.value)
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
