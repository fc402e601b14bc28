//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the cache core depends on. Transports and data sources
//! implement these traits; the [`Group`](crate::group::Group) only ever sees
//! the traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cache Core                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │       Loader │ PeerPicker │ PeerGetter               │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │   LoaderFn │ InProcessPool │ HttpPool + HttpGetter   │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// =============================================================================
// Loader Port
// =============================================================================

/// Source of truth consulted on a full cache miss.
///
/// Called concurrently for different keys; never concurrently for the same
/// key within one group.
///
/// # Example
///
/// ```ignore
/// struct Database { /* ... */ }
///
/// #[async_trait]
/// impl Loader for Database {
///     async fn load(&self, key: &str) -> Result<Vec<u8>> {
///         self.query(key).await
///     }
/// }
/// ```
#[async_trait]
pub trait Loader: Send + Sync {
    /// Fetch the authoritative bytes for `key`.
    async fn load(&self, key: &str) -> Result<Vec<u8>>;
}

/// Adapts a synchronous closure into a [`Loader`].
pub struct LoaderFn<F>(pub F);

#[async_trait]
impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        (self.0)(key)
    }
}

impl<F> std::fmt::Debug for LoaderFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoaderFn")
    }
}

// =============================================================================
// Peer Ports
// =============================================================================

/// Fetches keys from one specific remote node.
///
/// Implementations own the request deadline.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetch `key` of `group` from the remote node.
    async fn get(&self, group: &str, key: &str) -> Result<Bytes>;

    /// Identifier of the remote node, for logs
    fn peer_id(&self) -> &str;
}

/// Chooses the node responsible for a key.
pub trait PeerPicker: Send + Sync {
    /// Getter for the remote owner of `key`, or `None` when the key belongs
    /// to this node or no peers are known.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

// =============================================================================
// Tests
// =============================================================================
