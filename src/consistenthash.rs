//! Consistent Hash Ring
//!
//! Maps keys onto peers through a ring of replicated virtual nodes.
//!
//! ```text
//!              hash("0peerA")
//!                   ●
//!        ●                     ●  hash("1peerB")
//!   hash("2peerA")
//!        ●        key ──►      ●  hash("0peerB")
//!                   ●
//! ```
//!
//! A key belongs to the first virtual node clockwise from `hash(key)`.
//! Adding a peer only moves the keys that land in front of its new virtual
//! nodes; every other key keeps its owner.

use std::collections::HashMap;

/// Ring hash function
pub type HashFn = fn(&[u8]) -> u32;

/// Default CRC-32 (IEEE) ring hash
pub fn default_hash(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Consistent hash ring of peer identifiers.
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Sorted virtual node positions
    keys: Vec<u32>,
    /// Virtual node position -> peer
    ring: HashMap<u32, String>,
}

impl HashRing {
    /// Create an empty ring with `replicas` virtual nodes per peer.
    ///
    /// `hash` defaults to CRC-32 when `None`.
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            hash: hash.unwrap_or(default_hash),
            replicas,
            keys: Vec::new(),
            ring: HashMap::new(),
        }
    }

    /// Add peers to the ring.
    pub fn add<S: AsRef<str>>(&mut self, peers: &[S]) {
        for peer in peers {
            let peer = peer.as_ref();
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", i, peer).as_bytes());
                self.keys.push(position);
                self.ring.insert(position, peer.to_string());
            }
        }
        self.keys.sort_unstable();
    }

    /// Remove a peer and all of its virtual nodes.
    pub fn remove(&mut self, peer: &str) {
        for i in 0..self.replicas {
            let position = (self.hash)(format!("{}{}", i, peer).as_bytes());
            if self.ring.get(&position).is_some_and(|owner| owner == peer) {
                self.ring.remove(&position);
            }
        }
        let ring = &self.ring;
        self.keys.retain(|position| ring.contains_key(position));
    }

    /// Peer owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.keys.partition_point(|&position| position < hash);
        let position = self.keys[idx % self.keys.len()];
        self.ring.get(&position).map(String::as_str)
    }

    /// Number of distinct peers on the ring
    pub fn len(&self) -> usize {
        let mut peers: Vec<&str> = self.ring.values().map(String::as_str).collect();
        peers.sort_unstable();
        peers.dedup();
        peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Virtual nodes per peer
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

impl std::fmt::Debug for HashRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("virtual_nodes", &self.keys.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
