//! In-Process Peer Adapter
//!
//! Implements the peer ports without a network: each "node" is a
//! [`Registry`] living in the same process. Used by tests and by
//! single-binary clusters.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::info;

use super::{PeerSet, DEFAULT_REPLICAS};
use crate::consistenthash::HashFn;
use crate::domain::{PeerGetter, PeerPicker};
use crate::error::{Error, Result};
use crate::group::Registry;

/// Fetches from another in-process node's registry.
///
/// Holds the registry weakly; nodes usually point at each other.
pub struct RegistryGetter {
    id: String,
    registry: Weak<Registry>,
}

impl RegistryGetter {
    pub fn new(id: impl Into<String>, registry: &Arc<Registry>) -> Self {
        Self {
            id: id.into(),
            registry: Arc::downgrade(registry),
        }
    }
}

#[async_trait]
impl PeerGetter for RegistryGetter {
    async fn get(&self, group: &str, key: &str) -> Result<Bytes> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| Error::peer(&self.id, "node has shut down"))?;
        registry
            .serve(group, key)
            .await
            .map(|value| value.to_bytes())
            .map_err(|e| Error::peer(&self.id, e))
    }

    fn peer_id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for RegistryGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryGetter")
            .field("id", &self.id)
            .field("alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}

/// Peer picker over arbitrary [`PeerGetter`]s.
pub struct InProcessPool {
    self_id: String,
    replicas: usize,
    hash: Option<HashFn>,
    peers: Mutex<PeerSet>,
}

impl InProcessPool {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self::with_ring(self_id, DEFAULT_REPLICAS, None)
    }

    pub fn with_ring(self_id: impl Into<String>, replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            self_id: self_id.into(),
            replicas,
            hash,
            peers: Mutex::new(PeerSet::new(replicas, hash)),
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Replace membership with this node plus `peers`.
    pub fn set<I>(&self, peers: I)
    where
        I: IntoIterator<Item = (String, Arc<dyn PeerGetter>)>,
    {
        let mut next = PeerSet::new(self.replicas, self.hash);
        next.insert(&self.self_id, None);
        for (id, getter) in peers {
            if id != self.self_id {
                next.insert(&id, Some(getter));
            }
        }

        let members = next.len();
        *self.peers.lock() = next;
        info!(node = %self.self_id, members, "in-process peers set");
    }

    /// Ring member that owns `key`
    pub fn owner(&self, key: &str) -> Option<String> {
        self.peers.lock().owner(key).map(str::to_string)
    }

    /// Remote members, sorted
    pub fn peers(&self) -> Vec<String> {
        self.peers.lock().members()
    }
}

impl PeerPicker for InProcessPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        self.peers.lock().pick(&self.self_id, key)
    }
}

impl std::fmt::Debug for InProcessPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessPool")
            .field("self_id", &self.self_id)
            .field("peers", &self.peers())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
