//! Rank service: cached reads, recomputation and upline propagation.
//!
//! A structural change to the network only alters the rank of the moved
//! user and of everyone above them, so writes walk the sponsor chain
//! upward. Downline entries are left to the lazy cache-miss path.

use crate::cache::RankCache;
use crate::children::{ChildrenMap, ChildrenMapCache};
use crate::config::EngineConfig;
use crate::depth::{rank_of, subtree_depth, DepthMemo};
use crate::error::{Error, Result};
use crate::event::NetworkEvent;
use crate::models::{Rank, UserId, UserRecord};
use crate::store::UserStore;
use serde::Serialize;
use std::collections::HashSet;

/// Why an upline walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "user", rename_all = "snake_case")]
pub enum WalkStop {
    /// Reached a user without a sponsor
    Root,
    /// The sponsor chain led back to an already visited user
    Cycle(UserId),
    /// The hop cap was reached
    HopLimit,
    /// A user on the chain has no record
    MissingUser(UserId),
}

/// A rank written during propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankChange {
    pub user: UserId,
    pub previous: Rank,
    pub rank: Rank,
}

/// Outcome of [`RankService::propagate_upline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UplineReport {
    /// Users recomputed, starting user first
    pub updated: Vec<RankChange>,
    pub stop: WalkStop,
}

impl UplineReport {
    /// New rank of `id`, if the walk reached it.
    pub fn rank_of(&self, id: &UserId) -> Option<Rank> {
        self.updated.iter().find(|c| &c.user == id).map(|c| c.rank)
    }
}

/// Outcome of [`RankService::invalidate_chain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Users whose cache entry was deleted, starting user first
    pub invalidated: Vec<UserId>,
    pub stop: WalkStop,
}

/// Outcome of [`RankService::recompute_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    pub users: usize,
    pub changed: usize,
    pub cycle_cuts: usize,
}

/// Visited set and hop cap shared by both upline walks.
struct UplineWalk {
    visited: HashSet<UserId>,
    max_hops: usize,
}

impl UplineWalk {
    fn new(max_hops: usize) -> Self {
        Self {
            visited: HashSet::new(),
            max_hops,
        }
    }

    /// Admit `id` as the next step, or say why the walk must end.
    fn enter(&mut self, id: &UserId) -> std::result::Result<(), WalkStop> {
        if self.visited.contains(id) {
            tracing::warn!(user = %id, "Sponsor cycle on upline walk, stopping");
            return Err(WalkStop::Cycle(id.clone()));
        }
        if self.visited.len() >= self.max_hops {
            tracing::warn!(user = %id, hops = self.max_hops, "Upline walk hit hop cap, stopping");
            return Err(WalkStop::HopLimit);
        }
        self.visited.insert(id.clone());
        Ok(())
    }
}

/// The rank engine over a [`UserStore`].
#[derive(Debug)]
pub struct RankService<S> {
    store: S,
    config: EngineConfig,
    children: ChildrenMapCache,
    cache: RankCache,
}

impl<S: UserStore> RankService<S> {
    /// Create a service over `store`.
    pub fn new(store: S, config: EngineConfig) -> Self {
        let children = ChildrenMapCache::new(config.children_map_ttl);
        let cache = RankCache::new(config.rank_namespace.clone());
        Self {
            store,
            config,
            children,
            cache,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drop the children-map snapshot so the next computation rescans.
    pub async fn invalidate_children_map(&self) {
        self.children.invalidate().await;
    }

    /// Current children-map snapshot, rebuilt if stale.
    pub async fn children_map(&self) -> Result<std::sync::Arc<ChildrenMap>> {
        self.children.get_or_build(&self.store).await
    }

    /// Rank of `id`, served from the cache when allowed.
    ///
    /// On a miss, or with `use_cache == false`, the rank is recomputed and
    /// the cache entry overwritten. The user record is not touched.
    pub async fn get_rank(&self, id: &UserId, use_cache: bool) -> Result<Rank> {
        if use_cache {
            if let Some(rank) = self.cache.get(&self.store, id).await? {
                tracing::debug!(user = %id, rank, "Rank cache hit");
                return Ok(rank);
            }
        }

        let map = self.children.get_or_build(&self.store).await?;
        let rank = rank_of(id, &map);
        self.cache.put(&self.store, id, rank).await?;
        tracing::debug!(user = %id, rank, "Rank computed");
        Ok(rank)
    }

    /// Delete the cached rank of `id` without recomputing it.
    pub async fn invalidate(&self, id: &UserId) -> Result<()> {
        self.cache.invalidate(&self.store, id).await
    }

    /// Recompute and persist the rank of `id`.
    ///
    /// A missing user is logged and reported as rank 0 with nothing
    /// written. Use [`try_update_rank`](Self::try_update_rank) to tell that
    /// case apart.
    pub async fn update_rank(&self, id: &UserId) -> Result<Rank> {
        match self.try_update_rank(id).await {
            Err(Error::UserNotFound(missing)) => {
                tracing::warn!(user = %missing, "Rank update for unknown user");
                Ok(0)
            }
            other => other,
        }
    }

    /// Recompute and persist the rank of `id`, failing if it has no record.
    pub async fn try_update_rank(&self, id: &UserId) -> Result<Rank> {
        let map = self.children.rebuild(&self.store).await?;
        let mut user = self
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| Error::UserNotFound(id.clone()))?;

        let rank = rank_of(id, &map);
        self.persist(&mut user, rank).await?;
        Ok(rank)
    }

    /// Recompute `id` and every user above it.
    ///
    /// One children-map snapshot serves the whole walk. Ranks already
    /// written stay written if a later store access fails.
    pub async fn propagate_upline(&self, id: &UserId) -> Result<UplineReport> {
        let map = self.children.rebuild(&self.store).await?;
        let mut memo = DepthMemo::new();
        let mut walk = UplineWalk::new(self.config.max_upline_hops);
        let mut updated: Vec<RankChange> = Vec::new();
        let mut current = id.clone();

        let stop = loop {
            if let Err(stop) = walk.enter(&current) {
                break stop;
            }

            let mut user = match self.store.get_user(&current).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    tracing::warn!(user = %current, "Upline walk reached unknown user");
                    break WalkStop::MissingUser(current);
                }
                Err(e) => return Err(interrupted(current, updated_ids(&updated), e)),
            };

            // Ranks memoized across a cycle cut depend on where the walk
            // entered the cycle.
            if memo.cycle_cuts() > 0 {
                memo.clear();
            }
            let rank = subtree_depth(&current, &map, &mut memo);
            let previous = user.rank;
            let sponsor = user.sponsor_id.clone();

            if let Err(e) = self.persist(&mut user, rank).await {
                return Err(interrupted(current, updated_ids(&updated), e));
            }
            updated.push(RankChange {
                user: current,
                previous,
                rank,
            });

            match sponsor {
                Some(sponsor) => current = sponsor,
                None => break WalkStop::Root,
            }
        };

        tracing::info!(
            user = %id,
            updated = updated.len(),
            stop = ?stop,
            "Propagated rank upline"
        );
        Ok(UplineReport { updated, stop })
    }

    /// Delete the cached rank of `id` and of every user above it.
    ///
    /// Nothing is recomputed; the next read of each user misses and
    /// recomputes against a fresh children map.
    pub async fn invalidate_chain(&self, id: &UserId) -> Result<InvalidationReport> {
        self.cache.invalidate(&self.store, id).await?;
        self.children.invalidate().await;

        let mut walk = UplineWalk::new(self.config.max_upline_hops);
        let mut invalidated: Vec<UserId> = Vec::new();
        let mut current = id.clone();

        let stop = loop {
            if let Err(stop) = walk.enter(&current) {
                break stop;
            }
            if &current != id {
                if let Err(e) = self.cache.invalidate(&self.store, &current).await {
                    return Err(interrupted(current, invalidated, e));
                }
            }

            let sponsor = match self.store.get_user(&current).await {
                Ok(Some(user)) => user.sponsor_id,
                Ok(None) => {
                    tracing::warn!(user = %current, "Invalidation walk reached unknown user");
                    invalidated.push(current.clone());
                    break WalkStop::MissingUser(current);
                }
                Err(e) => {
                    invalidated.push(current.clone());
                    return Err(interrupted(current, invalidated, e));
                }
            };
            invalidated.push(current);

            match sponsor {
                Some(sponsor) => current = sponsor,
                None => break WalkStop::Root,
            }
        };

        tracing::debug!(user = %id, invalidated = invalidated.len(), "Invalidated rank chain");
        Ok(InvalidationReport { invalidated, stop })
    }

    /// Rewrite the rank of every network user from one scan.
    pub async fn recompute_all(&self) -> Result<RecomputeReport> {
        let users = self.store.all_users().await?;
        let map = ChildrenMap::from_users(&users);
        self.children.invalidate().await;

        let mut memo = DepthMemo::new();
        let mut report = RecomputeReport {
            users: users.len(),
            ..RecomputeReport::default()
        };

        for mut user in users {
            if memo.cycle_cuts() > 0 {
                report.cycle_cuts += memo.cycle_cuts();
                memo.clear();
            }
            let rank = subtree_depth(&user.id, &map, &mut memo);
            if user.rank != rank {
                report.changed += 1;
            }
            self.persist(&mut user, rank).await?;
        }
        report.cycle_cuts += memo.cycle_cuts();

        tracing::info!(
            users = report.users,
            changed = report.changed,
            cycle_cuts = report.cycle_cuts,
            "Recomputed all ranks"
        );
        Ok(report)
    }

    /// Bring ranks in line after a committed structural change.
    ///
    /// Returns one report per upline walked: the user's own chain first,
    /// then the previous sponsor's.
    pub async fn apply(&self, event: &NetworkEvent) -> Result<Vec<UplineReport>> {
        let mut reports = Vec::new();
        match event {
            NetworkEvent::Joined { user } | NetworkEvent::Responsored { user, .. } => {
                reports.push(self.propagate_upline(user).await?);
            }
            NetworkEvent::Removed { user, .. } => {
                self.invalidate(user).await?;
            }
        }
        if let Some(previous) = event.previous_sponsor() {
            reports.push(self.propagate_upline(previous).await?);
        }
        Ok(reports)
    }

    /// Write `rank` onto the record, then into the cache.
    ///
    /// If either write fails the cache entry is dropped so no stale value
    /// outlives the error.
    async fn persist(&self, user: &mut UserRecord, rank: Rank) -> Result<()> {
        user.rank = rank;
        let written = match self.store.put_user(user).await {
            Ok(()) => self.cache.put(&self.store, &user.id, rank).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = self.cache.invalidate(&self.store, &user.id).await {
                tracing::error!(user = %user.id, error = %cleanup, "Failed to drop rank cache entry");
            }
            return Err(e);
        }
        Ok(())
    }
}

fn updated_ids(updated: &[RankChange]) -> Vec<UserId> {
    updated.iter().map(|c| c.user.clone()).collect()
}

fn interrupted(at: UserId, applied: Vec<UserId>, source: Error) -> Error {
    if applied.is_empty() {
        return source;
    }
    tracing::error!(
        user = %at,
        applied = applied.len(),
        error = %source,
        "Upline walk interrupted"
    );
    Error::Propagation {
        at,
        applied,
        source: Box::new(source),
    }
}
