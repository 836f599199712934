//! Sponsor → downline adjacency, rebuilt from a full scan of the store.
//!
//! Building the map costs one `all_users` scan, so the latest snapshot is
//! kept in a single TTL slot. Rank-affecting mutations invalidate the slot
//! before recomputing, which keeps staleness a freshness concern only.

use crate::error::Result;
use crate::models::{UserId, UserRecord};
use crate::store::UserStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Direct downline of every user in one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildrenMap {
    children: HashMap<UserId, Vec<UserId>>,
}

impl ChildrenMap {
    /// Derive the map from user records.
    ///
    /// Every network user gets an entry, possibly empty. Administrative
    /// accounts are skipped even if the store hands them over.
    pub fn from_users<'a, I>(users: I) -> Self
    where
        I: IntoIterator<Item = &'a UserRecord>,
    {
        let mut children: HashMap<UserId, Vec<UserId>> = HashMap::new();
        for user in users.into_iter().filter(|u| u.is_network_member()) {
            children.entry(user.id.clone()).or_default();
            if let Some(sponsor) = &user.sponsor_id {
                children
                    .entry(sponsor.clone())
                    .or_default()
                    .push(user.id.clone());
            }
        }
        Self { children }
    }

    /// Direct downline of `id`. Unknown users have none.
    pub fn children(&self, id: &UserId) -> &[UserId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `id` has an entry.
    pub fn contains(&self, id: &UserId) -> bool {
        self.children.contains_key(id)
    }

    /// All users with an entry.
    pub fn user_ids(&self) -> impl Iterator<Item = &UserId> {
        self.children.keys()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Scan the store and build a fresh map.
pub async fn build_children_map<S: UserStore>(store: &S) -> Result<ChildrenMap> {
    let users = store.all_users().await?;
    let map = ChildrenMap::from_users(&users);
    tracing::debug!(users = users.len(), "Built children map");
    Ok(map)
}

#[derive(Debug)]
struct CachedMap {
    built_at: Instant,
    map: Arc<ChildrenMap>,
}

/// Single-slot, time-bounded cache of the children map.
///
/// Rebuilds happen under the slot lock, so concurrent callers that miss
/// together share one scan.
#[derive(Debug)]
pub struct ChildrenMapCache {
    ttl: Duration,
    slot: Mutex<Option<CachedMap>>,
}

impl ChildrenMapCache {
    /// Create an empty cache. A zero TTL disables reuse.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached snapshot if still fresh, otherwise rescan.
    pub async fn get_or_build<S: UserStore>(&self, store: &S) -> Result<Arc<ChildrenMap>> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.built_at.elapsed() < self.ttl {
                tracing::debug!("Children map cache hit");
                return Ok(Arc::clone(&cached.map));
            }
        }
        Self::fill(&mut slot, store).await
    }

    /// Drop the snapshot and rescan in one step.
    pub async fn rebuild<S: UserStore>(&self, store: &S) -> Result<Arc<ChildrenMap>> {
        let mut slot = self.slot.lock().await;
        *slot = None;
        Self::fill(&mut slot, store).await
    }

    /// Clear the snapshot unconditionally.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Whether a snapshot is held, fresh or not.
    pub async fn is_populated(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    async fn fill<S: UserStore>(
        slot: &mut Option<CachedMap>,
        store: &S,
    ) -> Result<Arc<ChildrenMap>> {
        // On failure the slot stays empty; nothing stale is handed out.
        let map = Arc::new(build_children_map(store).await?);
        *slot = Some(CachedMap {
            built_at: Instant::now(),
            map: Arc::clone(&map),
        });
        Ok(map)
    }
}
