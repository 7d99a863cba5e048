use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::capability::CapabilitySet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub team_id: Option<String>,
}

impl CacheKey {
    pub fn new(user_id: Uuid, project_id: Uuid, team_id: Option<&str>) -> Self {
        Self {
            user_id,
            project_id,
            team_id: team_id.map(str::to_owned),
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CapabilitySet>,
    epoch: u64,
}

/// Read-through cache of resolved capabilities.
///
/// Every invalidation bumps an epoch. A reader records the epoch before it
/// goes to the store and [`CapabilityCache::insert`] drops the value if the
/// epoch moved in between, so a result computed from pre-write data is never
/// served after the write returns.
///
/// The map holds at most `capacity` entries. Once full, new keys are not
/// cached until an invalidation frees room; existing keys can still be
/// refreshed.
#[derive(Debug, Clone)]
pub struct CapabilityCache {
    inner: Arc<RwLock<CacheInner>>,
    enabled: bool,
    capacity: usize,
}

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

impl CapabilityCache {
    pub fn new(enabled: bool) -> Self {
        Self::with_capacity(enabled, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(enabled: bool, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            enabled: enabled && capacity > 0,
            capacity,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CapabilitySet> {
        if !self.enabled {
            return None;
        }
        self.inner.read().await.entries.get(key).copied()
    }

    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Returns false when the value was discarded as stale or the cache is
    /// full.
    pub async fn insert(&self, key: CacheKey, value: CapabilitySet, observed_epoch: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let mut inner = self.inner.write().await;
        if inner.epoch != observed_epoch {
            return false;
        }
        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(&key) {
            return false;
        }
        inner.entries.insert(key, value);
        true
    }

    /// Drops every entry for `user_id` on `project_id`, across all teams.
    pub async fn invalidate_membership(&self, user_id: Uuid, project_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.epoch += 1;
        inner
            .entries
            .retain(|key, _| !(key.user_id == user_id && key.project_id == project_id));
    }

    pub async fn invalidate_user(&self, user_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.epoch += 1;
        inner.entries.retain(|key, _| key.user_id != user_id);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.epoch += 1;
        inner.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}
