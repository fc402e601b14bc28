//! Node configuration
//!
//! Optional YAML file read by the `peercache` binary. Every field has a
//! default, so an empty file is a valid single-node config. Command-line
//! flags override whatever the file sets.
//!
//! ```yaml
//! port: 8001
//! peers:
//!   - http://localhost:8001
//!   - http://localhost:8002
//! cache:
//!   cache_bytes: 2048
//!   hot_qps_threshold: 10
//!   hot_ttl_secs: 60
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::{HttpPoolOptions, DEFAULT_BASE_PATH, DEFAULT_PEER_TIMEOUT, DEFAULT_REPLICAS};
use crate::cache::EvictionPolicy;
use crate::error::{Error, Result};
use crate::group::{GroupConfig, DEFAULT_CACHE_BYTES, DEFAULT_HOT_QPS_THRESHOLD, DEFAULT_HOT_TTL};

/// Settings of one node process
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Host part of this node's URL
    pub host: String,
    /// Peer server port
    pub port: u16,
    /// Base URLs of every cluster member, this node included
    pub peers: Vec<String>,
    /// Run the front-end API server
    pub api: bool,
    /// Front-end API bind address
    pub api_addr: String,
    /// Prometheus endpoint bind address
    pub metrics_addr: String,
    /// Peer request path prefix
    pub base_path: String,
    /// Virtual nodes per peer
    pub replicas: usize,
    /// Outbound peer request deadline in seconds
    pub peer_timeout_secs: u64,
    /// Cache tier settings of the served groups
    pub cache: CacheSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8001,
            peers: Vec::new(),
            api: false,
            api_addr: "127.0.0.1:9999".to_string(),
            metrics_addr: "127.0.0.1:9100".to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            peer_timeout_secs: DEFAULT_PEER_TIMEOUT.as_secs(),
            cache: CacheSettings::default(),
        }
    }
}

impl NodeConfig {
    /// Parse a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid node config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.replicas == 0 {
            return Err(Error::Config("replicas must be at least 1".to_string()));
        }
        if self.peer_timeout_secs == 0 {
            return Err(Error::Config("peer_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// This node's base URL, as peers address it
    pub fn self_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Cluster members; a node without peers forms a cluster of one
    pub fn members(&self) -> Vec<String> {
        if self.peers.is_empty() {
            vec![self.self_url()]
        } else {
            self.peers.clone()
        }
    }

    pub fn pool_options(&self) -> HttpPoolOptions {
        HttpPoolOptions {
            base_path: self.base_path.clone(),
            replicas: self.replicas,
            hash: None,
            timeout: Duration::from_secs(self.peer_timeout_secs),
        }
    }
}

/// Eviction policy name as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Lru,
    Lfu,
}

/// Cache tier settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub cache_bytes: u64,
    pub hot_cache_bytes: Option<u64>,
    pub main_policy: PolicyKind,
    pub hot_policy: PolicyKind,
    pub hot_qps_threshold: u64,
    /// Expiry of LFU entries; 0 disables expiry
    pub hot_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_bytes: DEFAULT_CACHE_BYTES,
            hot_cache_bytes: None,
            main_policy: PolicyKind::Lru,
            hot_policy: PolicyKind::Lfu,
            hot_qps_threshold: DEFAULT_HOT_QPS_THRESHOLD,
            hot_ttl_secs: DEFAULT_HOT_TTL.as_secs(),
        }
    }
}

impl CacheSettings {
    fn policy(&self, kind: PolicyKind) -> EvictionPolicy {
        match kind {
            PolicyKind::Lru => EvictionPolicy::Lru,
            PolicyKind::Lfu => EvictionPolicy::Lfu {
                ttl: (self.hot_ttl_secs > 0).then(|| Duration::from_secs(self.hot_ttl_secs)),
            },
        }
    }

    pub fn group_config(&self) -> GroupConfig {
        GroupConfig {
            cache_bytes: self.cache_bytes,
            hot_cache_bytes: self.hot_cache_bytes,
            main_policy: self.policy(self.main_policy),
            hot_policy: self.policy(self.hot_policy),
            hot_qps_threshold: self.hot_qps_threshold,
        }
    }
}
