//! Persisted rank cache entries.
//!
//! Entries never expire. A present entry is trusted until someone deletes
//! it; absence means the rank must be recomputed.

use crate::error::Result;
use crate::models::{Rank, UserId};
use crate::store::UserStore;

/// Encodes rank entries under `<namespace>:<user_id>` keys.
#[derive(Debug, Clone)]
pub struct RankCache {
    namespace: String,
}

impl RankCache {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Store key for a user's entry.
    pub fn key(&self, id: &UserId) -> String {
        format!("{}:{}", self.namespace, id)
    }

    /// Read a cached rank.
    pub async fn get<S: UserStore>(&self, store: &S, id: &UserId) -> Result<Option<Rank>> {
        match store.get_cached(&self.key(id)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Write a rank, replacing any previous entry.
    pub async fn put<S: UserStore>(&self, store: &S, id: &UserId, rank: Rank) -> Result<()> {
        let value = serde_json::to_vec(&rank)?;
        store.put_cached(&self.key(id), value).await
    }

    /// Delete a user's entry.
    pub async fn invalidate<S: UserStore>(&self, store: &S, id: &UserId) -> Result<()> {
        store.delete_cached(&self.key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::MemoryStore;

    #[test]
    fn key_format() {
        let cache = RankCache::new("rank");
        assert_eq!(cache.key(&UserId::from("abc")), "rank:abc");
    }

    #[tokio::test]
    async fn put_get_invalidate() {
        let store = MemoryStore::new();
        let cache = RankCache::new("rank");
        let id = UserId::from("a");

        assert_eq!(cache.get(&store, &id).await.unwrap(), None);
        cache.put(&store, &id, 4).await.unwrap();
        assert_eq!(cache.get(&store, &id).await.unwrap(), Some(4));
        assert_eq!(store.get_cached("rank:a").await.unwrap(), Some(b"4".to_vec()));

        cache.invalidate(&store, &id).await.unwrap();
        assert_eq!(cache.get(&store, &id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_entry_is_an_error() {
        let store = MemoryStore::new();
        store.put_cached("rank:a", b"-1".to_vec()).await.unwrap();

        let err = RankCache::new("rank")
            .get(&store, &UserId::from("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
