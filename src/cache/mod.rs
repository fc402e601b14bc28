//! Capacity-Bounded Cache Tiers
//!
//! Byte-bounded eviction stores and the thread-safe tier wrapper used by
//! every [`Group`](crate::group::Group).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    ConcurrentCache                            │
//! │             Mutex<Option<Box<dyn EvictionStore>>>             │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │  LruStore                    │  LfuStore                     │
//! │  index-linked list, O(1)     │  indexed min-heap, O(log n)   │
//! │  strict recency order        │  frequency order + TTL        │
//! └──────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! Each entry is charged `key.len() + value.byte_len()` bytes. A capacity of
//! zero disables eviction.

mod byteview;
mod concurrent;
mod lfu;
mod lru;
mod store;

pub use byteview::ByteView;
pub use concurrent::{ConcurrentCache, TierUsage};
pub use lfu::LfuStore;
pub use lru::LruStore;
pub use store::{EvictionPolicy, EvictionStore, OnEvicted, Value};
