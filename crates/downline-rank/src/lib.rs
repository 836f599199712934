//! Downline Rank - rank engine for referral networks
//!
//! Every participant's rank is the depth of their downline subtree. Ranks
//! are cached in the backing key-value store with no expiry and kept
//! consistent by recomputing the upline whenever the network changes shape.
//!
//! # Architecture
//!
//! - **Models**: [`UserRecord`] with an optional sponsor
//! - **Store**: [`UserStore`] contract over the key-value backend, plus [`MemoryStore`]
//! - **Children map**: sponsor → direct downline, cached in one TTL slot
//! - **Depth**: memoized, cycle-safe subtree depth
//! - **Service**: [`RankService`] - `get_rank`, `update_rank`,
//!   `propagate_upline`, `invalidate_chain`
//!
//! # Example
//!
//! ```no_run
//! use downline_rank::{EngineConfig, MemoryStore, RankService, UserId, UserRecord, UserStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::with_users([
//!         UserRecord::new("alice"),
//!         UserRecord::sponsored_by("bob", "alice"),
//!     ]);
//!     let service = RankService::new(store, EngineConfig::from_env()?);
//!
//!     // carol signs up under bob
//!     service.store().put_user(&UserRecord::sponsored_by("carol", "bob")).await?;
//!     service.propagate_upline(&UserId::from("carol")).await?;
//!
//!     assert_eq!(service.get_rank(&UserId::from("alice"), true).await?, 2);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod children;
pub mod config;
pub mod depth;
pub mod error;
pub mod event;
pub mod models;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::RankCache;
pub use children::{build_children_map, ChildrenMap, ChildrenMapCache};
pub use config::EngineConfig;
pub use depth::{rank_of, subtree_depth, DepthMemo};
pub use error::{Error, Result};
pub use event::NetworkEvent;
pub use models::{Rank, Role, UserId, UserRecord};
pub use service::{
    InvalidationReport, RankChange, RankService, RecomputeReport, UplineReport, WalkStop,
};
pub use store::{MemoryStore, StoreSnapshot, UserStore};
