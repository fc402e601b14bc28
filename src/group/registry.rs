//! Group registry
//!
//! The set of groups a process serves. Created by the application and
//! handed to transports by `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{Group, GroupBuilder, GroupConfig};
use crate::cache::ByteView;
use crate::domain::Loader;
use crate::error::{Error, Result};

/// Name → group map
#[derive(Default)]
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a group with default tier settings.
    ///
    /// Validated like [`Registry::register`]; an empty name is rejected.
    pub fn new_group<L: Loader + 'static>(
        &self,
        name: impl Into<String>,
        cache_bytes: u64,
        loader: L,
    ) -> Result<Arc<Group>> {
        self.register(
            GroupBuilder::new(name)
                .config(GroupConfig::with_cache_bytes(cache_bytes))
                .loader(loader),
        )
    }

    /// Build and register a group. A group with the same name is replaced.
    pub fn register(&self, builder: GroupBuilder) -> Result<Arc<Group>> {
        let group = builder.build()?;
        Ok(self.insert(group))
    }

    fn insert(&self, group: Group) -> Arc<Group> {
        let group = Arc::new(group);
        let name = group.name().to_string();
        let replaced = self
            .groups
            .write()
            .insert(name.clone(), Arc::clone(&group))
            .is_some();
        info!(
            group = %name,
            cache_bytes = group.config().cache_bytes,
            replaced,
            "registered group"
        );
        group
    }

    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Registered group names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered groups, sorted by name
    pub fn groups(&self) -> Vec<Arc<Group>> {
        let mut groups: Vec<_> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }

    /// Answer an inbound peer request for `key` in `group`.
    pub async fn serve(&self, group: &str, key: &str) -> Result<ByteView> {
        let target = self
            .get(group)
            .ok_or_else(|| Error::GroupNotFound(group.to_string()))?;
        target.get(key).await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("groups", &self.names())
            .finish()
    }
}
