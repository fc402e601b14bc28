//! Group configuration and builder

use std::sync::Arc;
use std::time::Duration;

use super::Group;
use crate::cache::EvictionPolicy;
use crate::domain::Loader;
use crate::error::{Error, Result};

/// Default main-tier capacity (2 KiB, the demo `scores` group size)
pub const DEFAULT_CACHE_BYTES: u64 = 2 << 10;

/// Remote fetches per minute that promote a key into the hot tier
pub const DEFAULT_HOT_QPS_THRESHOLD: u64 = 10;

/// How long a promoted key stays in the hot tier
pub const DEFAULT_HOT_TTL: Duration = Duration::from_secs(60);

/// Sizing and policy of one group's two cache tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupConfig {
    /// Main tier capacity in bytes (0 = unbounded)
    pub cache_bytes: u64,
    /// Hot tier capacity in bytes; `None` means `cache_bytes / 8`, at
    /// least one byte when the main tier is bounded
    pub hot_cache_bytes: Option<u64>,
    /// Main tier eviction policy
    pub main_policy: EvictionPolicy,
    /// Hot tier eviction policy
    pub hot_policy: EvictionPolicy,
    /// Per-minute remote fetch rate at which a key is promoted
    pub hot_qps_threshold: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            cache_bytes: DEFAULT_CACHE_BYTES,
            hot_cache_bytes: None,
            main_policy: EvictionPolicy::Lru,
            hot_policy: EvictionPolicy::Lfu {
                ttl: Some(DEFAULT_HOT_TTL),
            },
            hot_qps_threshold: DEFAULT_HOT_QPS_THRESHOLD,
        }
    }
}

impl GroupConfig {
    /// Config with the given main capacity and defaults elsewhere
    pub fn with_cache_bytes(cache_bytes: u64) -> Self {
        Self {
            cache_bytes,
            ..Self::default()
        }
    }

    /// Effective hot tier capacity
    pub fn effective_hot_bytes(&self) -> u64 {
        match self.hot_cache_bytes {
            Some(bytes) => bytes,
            None if self.cache_bytes == 0 => 0,
            // a bounded main tier never gets an unbounded hot tier
            None => (self.cache_bytes / 8).max(1),
        }
    }
}

/// Step-by-step [`Group`] construction.
///
/// # Example
///
/// ```ignore
/// let group = GroupBuilder::new("scores")
///     .cache_bytes(2 << 10)
///     .hot_qps_threshold(5)
///     .loader(LoaderFn(|key: &str| db_lookup(key)))
///     .build()?;
/// ```
pub struct GroupBuilder {
    name: String,
    config: GroupConfig,
    loader: Option<Arc<dyn Loader>>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: GroupConfig::default(),
            loader: None,
        }
    }

    pub fn config(mut self, config: GroupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_bytes(mut self, cache_bytes: u64) -> Self {
        self.config.cache_bytes = cache_bytes;
        self
    }

    pub fn hot_cache_bytes(mut self, hot_cache_bytes: u64) -> Self {
        self.config.hot_cache_bytes = Some(hot_cache_bytes);
        self
    }

    pub fn main_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.main_policy = policy;
        self
    }

    pub fn hot_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.hot_policy = policy;
        self
    }

    pub fn hot_qps_threshold(mut self, threshold: u64) -> Self {
        self.config.hot_qps_threshold = threshold;
        self
    }

    pub fn loader<L: Loader + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn shared_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate and build the group.
    ///
    /// Fails with [`Error::Config`] when no loader was supplied or the name
    /// is empty.
    pub fn build(self) -> Result<Group> {
        if self.name.is_empty() {
            return Err(Error::Config("group name is required".to_string()));
        }
        let loader = self
            .loader
            .ok_or_else(|| Error::Config(format!("nil loader for group {}", self.name)))?;
        Ok(Group::new(self.name, self.config, loader))
    }
}

impl std::fmt::Debug for GroupBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LoaderFn;
    use crate::group::CacheType;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config() {
        let config = GroupConfig::default();
        assert_eq!(config.cache_bytes, 2048);
        assert_eq!(config.effective_hot_bytes(), 256);
        assert_eq!(config.main_policy, EvictionPolicy::Lru);
        assert_eq!(config.hot_qps_threshold, 10);
    }

    #[test]
    fn test_explicit_hot_bytes() {
        let mut config = GroupConfig::with_cache_bytes(1 << 20);
        assert_eq!(config.effective_hot_bytes(), 1 << 17);
        config.hot_cache_bytes = Some(0);
        assert_eq!(config.effective_hot_bytes(), 0);
    }

    #[test]
    fn test_small_main_keeps_hot_bounded() {
        for cache_bytes in 1..8 {
            assert_eq!(GroupConfig::with_cache_bytes(cache_bytes).effective_hot_bytes(), 1);
        }
        assert_eq!(GroupConfig::with_cache_bytes(0).effective_hot_bytes(), 0);

        let group = GroupBuilder::new("tiny")
            .cache_bytes(7)
            .loader(LoaderFn(|_: &str| Ok(Vec::new())))
            .build()
            .unwrap();
        let hot = group.cache_stats(CacheType::Hot);
        assert_eq!(hot.max_bytes, 1);
    }

    #[test]
    fn test_build_requires_loader() {
        let err = GroupBuilder::new("scores").build().unwrap_err();
        assert_matches!(err, Error::Config(msg) if msg.contains("scores"));
    }

    #[test]
    fn test_build_requires_name() {
        let err = GroupBuilder::new("")
            .loader(LoaderFn(|_: &str| Ok(Vec::new())))
            .build()
            .unwrap_err();
        assert_matches!(err, Error::Config(_));
    }

    #[test]
    fn test_builder_applies_settings() {
        let group = GroupBuilder::new("scores")
            .cache_bytes(4096)
            .hot_cache_bytes(128)
            .hot_policy(EvictionPolicy::Lru)
            .hot_qps_threshold(3)
            .loader(LoaderFn(|_: &str| Ok(Vec::new())))
            .build()
            .unwrap();

        assert_eq!(group.name(), "scores");
        assert_eq!(group.config().cache_bytes, 4096);
        assert_eq!(group.config().effective_hot_bytes(), 128);
        assert_eq!(group.config().hot_policy, EvictionPolicy::Lru);
        assert_eq!(group.config().hot_qps_threshold, 3);
    }
}
