//! Subtree depth: the rank of a user within a children map.
//!
//! `rank(u) = 0` without children, otherwise `1 + max(rank(c))` over the
//! direct downline. The walk is an explicit-stack post-order traversal, so
//! chain length never touches the call stack. Sponsor cycles from corrupted
//! records are cut where the walk re-enters a user it is still computing:
//! that edge contributes depth 0 and the cut is counted.

use crate::children::ChildrenMap;
use crate::models::{Rank, UserId};
use std::collections::{HashMap, HashSet};

/// Memoized ranks and in-progress marks for one computation pass.
///
/// Reusing a memo across calls on the same map skips shared subtrees.
#[derive(Debug, Default)]
pub struct DepthMemo {
    ranks: HashMap<UserId, Rank>,
    in_progress: HashSet<UserId>,
    cycle_cuts: usize,
}

impl DepthMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized rank of `id`, if computed in this pass.
    pub fn get(&self, id: &UserId) -> Option<Rank> {
        self.ranks.get(id).copied()
    }

    /// Number of back-edges cut so far.
    pub fn cycle_cuts(&self) -> usize {
        self.cycle_cuts
    }

    /// Number of memoized users.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Forget everything, including the cycle count.
    pub fn clear(&mut self) {
        self.ranks.clear();
        self.in_progress.clear();
        self.cycle_cuts = 0;
    }

    fn cut(&mut self, parent: &UserId, child: &UserId) {
        self.cycle_cuts += 1;
        tracing::warn!(
            user = %parent,
            downline = %child,
            "Sponsor cycle detected, counting back-edge as depth 0"
        );
    }
}

#[derive(Debug)]
struct Frame {
    id: UserId,
    next: usize,
    deepest: Option<Rank>,
}

impl Frame {
    fn new(id: UserId) -> Self {
        Self {
            id,
            next: 0,
            deepest: None,
        }
    }

    fn absorb(&mut self, child_rank: Rank) {
        self.deepest = Some(self.deepest.map_or(child_rank, |d| d.max(child_rank)));
    }

    fn rank(&self) -> Rank {
        self.deepest.map_or(0, |d| d.saturating_add(1))
    }
}

/// Compute the rank of `user` within `map`, memoizing every user visited.
pub fn subtree_depth(user: &UserId, map: &ChildrenMap, memo: &mut DepthMemo) -> Rank {
    if let Some(rank) = memo.get(user) {
        return rank;
    }
    if memo.in_progress.contains(user) {
        memo.cut(user, user);
        return 0;
    }

    memo.in_progress.insert(user.clone());
    let mut stack = vec![Frame::new(user.clone())];
    let mut result = 0;

    while let Some(frame) = stack.last_mut() {
        match map.children(&frame.id).get(frame.next) {
            Some(child) => {
                frame.next += 1;
                if let Some(rank) = memo.get(child) {
                    frame.absorb(rank);
                } else if memo.in_progress.contains(child) {
                    memo.cut(&frame.id, child);
                    frame.absorb(0);
                } else {
                    memo.in_progress.insert(child.clone());
                    stack.push(Frame::new(child.clone()));
                }
            }
            None => {
                let rank = frame.rank();
                if let Some(done) = stack.pop() {
                    memo.in_progress.remove(&done.id);
                    memo.ranks.insert(done.id, rank);
                }
                match stack.last_mut() {
                    Some(parent) => parent.absorb(rank),
                    None => result = rank,
                }
            }
        }
    }

    result
}

/// Compute the rank of `user` with a fresh memo.
pub fn rank_of(user: &UserId, map: &ChildrenMap) -> Rank {
    subtree_depth(user, map, &mut DepthMemo::new())
}
