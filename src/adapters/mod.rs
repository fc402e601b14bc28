//! Infrastructure Adapters
//!
//! Implementations of the peer ports from [`crate::domain::ports`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │              Ports: PeerPicker │ PeerGetter                 │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │  InProcessPool + RegistryGetter │ HttpPool + HttpGetter    │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use peercache::adapters::HttpPool;
//!
//! let pool = Arc::new(HttpPool::new("http://localhost:8001")?);
//! pool.set(&["http://localhost:8001", "http://localhost:8002"]);
//! group.register_peers(pool.clone())?;
//! ```

mod http;
mod in_process;

pub use http::{HttpGetter, HttpPool, HttpPoolOptions, DEFAULT_BASE_PATH, DEFAULT_PEER_TIMEOUT};
pub use in_process::{InProcessPool, RegistryGetter};

use std::collections::HashMap;
use std::sync::Arc;

use crate::consistenthash::{HashFn, HashRing};
use crate::domain::PeerGetter;

/// Virtual nodes per peer on the ring
pub const DEFAULT_REPLICAS: usize = 50;

/// Ring plus the getter for every ring member.
///
/// Both pools keep one of these behind a single mutex and swap it whole on
/// membership changes, so a ring entry never lacks its getter.
pub(crate) struct PeerSet {
    ring: HashRing,
    getters: HashMap<String, Arc<dyn PeerGetter>>,
}

impl PeerSet {
    pub(crate) fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            ring: HashRing::new(replicas, hash),
            getters: HashMap::new(),
        }
    }

    /// Add a ring member. `getter` is `None` for the local node.
    pub(crate) fn insert(&mut self, id: &str, getter: Option<Arc<dyn PeerGetter>>) {
        self.ring.add(&[id]);
        if let Some(getter) = getter {
            self.getters.insert(id.to_string(), getter);
        }
    }

    /// Getter for the owner of `key`, unless the owner is `self_id`.
    pub(crate) fn pick(&self, self_id: &str, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let owner = self.ring.get(key)?;
        if owner == self_id {
            return None;
        }
        self.getters.get(owner).cloned()
    }

    pub(crate) fn owner(&self, key: &str) -> Option<&str> {
        self.ring.get(key)
    }

    pub(crate) fn members(&self) -> Vec<String> {
        let mut members: Vec<_> = self.getters.keys().cloned().collect();
        members.sort();
        members
    }

    pub(crate) fn len(&self) -> usize {
        self.ring.len()
    }
}
