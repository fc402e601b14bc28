//! peercache - Peer-Aware Distributed Cache
//!
//! An in-process cache that partitions its keyspace across a cluster of
//! nodes. Each node answers local hits directly and fills misses either from
//! the node owning the key or from a user-supplied loader. Keys other nodes
//! fetch often are replicated into a small hot tier.
//!
//! # Architecture
//!
//! ```text
//!                  ┌───────────────────────────────┐
//!   get(key) ─────▶│            Group              │
//!                  │  hot tier │ main tier         │
//!                  │  SingleFlight │ key stats     │
//!                  └──────┬───────────────┬────────┘
//!                         │ PeerPicker    │ Loader
//!                         ▼               ▼
//!                  HashRing owner     source of truth
//!                         │
//!                         ▼
//!                  PeerGetter (HTTP / in-process)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Peer transports implementing domain ports
//! - [`cache`] - Eviction stores and the thread-safe cache tier
//! - [`config`] - Node configuration file
//! - [`consistenthash`] - Consistent-hash ring
//! - [`domain`] - Loader and peer ports
//! - [`error`] - Error types
//! - [`group`] - Groups and the group registry
//! - [`metrics`] - Group statistics and Prometheus exposition
//! - [`singleflight`] - Per-key call coalescing

pub mod adapters;
pub mod cache;
pub mod config;
pub mod consistenthash;
pub mod domain;
pub mod error;
pub mod group;
pub mod metrics;
pub mod singleflight;

// Re-export commonly used types
pub use adapters::{HttpGetter, HttpPool, InProcessPool, RegistryGetter};
pub use cache::{ByteView, EvictionPolicy};
pub use config::NodeConfig;
pub use consistenthash::HashRing;
pub use domain::{Loader, LoaderFn, PeerGetter, PeerPicker};
pub use error::{Error, Result};
pub use group::{CacheType, Group, GroupBuilder, GroupConfig, Registry};
pub use singleflight::SingleFlight;

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
