//! Engine configuration.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default lifetime of a children-map snapshot.
pub const DEFAULT_CHILDREN_MAP_TTL: Duration = Duration::from_secs(30);

/// Default cap on sponsor hops per upline walk.
pub const DEFAULT_MAX_UPLINE_HOPS: usize = 100;

/// Default key namespace for cached ranks (`rank:<user_id>`).
pub const DEFAULT_RANK_NAMESPACE: &str = "rank";

/// Configuration for a [`RankService`](crate::RankService).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How long a children-map snapshot may be reused
    pub children_map_ttl: Duration,

    /// Maximum users touched by one upline walk
    pub max_upline_hops: usize,

    /// Prefix of rank cache keys
    pub rank_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            children_map_ttl: DEFAULT_CHILDREN_MAP_TTL,
            max_upline_hops: DEFAULT_MAX_UPLINE_HOPS,
            rank_namespace: DEFAULT_RANK_NAMESPACE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    ///
    /// - `DOWNLINE_CHILDREN_TTL_SECS`
    /// - `DOWNLINE_MAX_UPLINE_HOPS`
    /// - `DOWNLINE_RANK_NAMESPACE`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("DOWNLINE_CHILDREN_TTL_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("Invalid DOWNLINE_CHILDREN_TTL_SECS: {}", raw))
            })?;
            config.children_map_ttl = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("DOWNLINE_MAX_UPLINE_HOPS") {
            config.max_upline_hops = raw.trim().parse().map_err(|_| {
                Error::Config(format!("Invalid DOWNLINE_MAX_UPLINE_HOPS: {}", raw))
            })?;
        }

        if let Some(raw) = lookup("DOWNLINE_RANK_NAMESPACE") {
            config.rank_namespace = raw.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Override the children-map TTL.
    pub fn with_children_map_ttl(mut self, ttl: Duration) -> Self {
        self.children_map_ttl = ttl;
        self
    }

    /// Override the upline hop cap.
    pub fn with_max_upline_hops(mut self, hops: usize) -> Self {
        self.max_upline_hops = hops;
        self
    }

    /// Override the rank cache namespace.
    pub fn with_rank_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.rank_namespace = namespace.into();
        self
    }

    /// Check values that would make the engine useless.
    pub fn validate(&self) -> Result<()> {
        if self.max_upline_hops == 0 {
            return Err(Error::Config("max_upline_hops must be at least 1".into()));
        }
        if self.rank_namespace.is_empty() {
            return Err(Error::Config("rank_namespace must not be empty".into()));
        }
        Ok(())
    }
}
