//! Record and cache access over a key-value store.
//!
//! The engine only ever talks to [`UserStore`]. Production deployments
//! implement it over their backend; [`MemoryStore`] backs tests, the CLI and
//! embedded use.

use crate::error::{Error, Result};
use crate::models::{UserId, UserRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key-value access to user records and cached values.
///
/// Implementations must be thread-safe. `all_users` must leave out
/// administrative accounts.
pub trait UserStore: Send + Sync {
    /// List every network user.
    fn all_users(&self) -> impl Future<Output = Result<Vec<UserRecord>>> + Send;

    /// Get a user by ID.
    fn get_user(&self, id: &UserId) -> impl Future<Output = Result<Option<UserRecord>>> + Send;

    /// Store a user, replacing any existing record.
    fn put_user(&self, user: &UserRecord) -> impl Future<Output = Result<()>> + Send;

    /// Get a cached value.
    fn get_cached(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store a cached value with no expiry.
    fn put_cached(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Delete a cached value. Deleting an absent key is not an error.
    fn delete_cached(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<S: UserStore> UserStore for Arc<S> {
    fn all_users(&self) -> impl Future<Output = Result<Vec<UserRecord>>> + Send {
        (**self).all_users()
    }

    fn get_user(&self, id: &UserId) -> impl Future<Output = Result<Option<UserRecord>>> + Send {
        (**self).get_user(id)
    }

    fn put_user(&self, user: &UserRecord) -> impl Future<Output = Result<()>> + Send {
        (**self).put_user(user)
    }

    fn get_cached(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send {
        (**self).get_cached(key)
    }

    fn put_cached(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send {
        (**self).put_cached(key, value)
    }

    fn delete_cached(&self, key: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).delete_cached(key)
    }
}

/// Serializable image of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    /// All records, administrative accounts included
    pub users: Vec<UserRecord>,

    /// Cached values keyed by their full key
    #[serde(default)]
    pub cache: BTreeMap<String, String>,
}

impl StoreSnapshot {
    /// Read a snapshot from a JSON file.
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write the snapshot as pretty JSON.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<BTreeMap<UserId, UserRecord>>,
    cache: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given records.
    pub fn with_users<I: IntoIterator<Item = UserRecord>>(users: I) -> Self {
        let users = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users: RwLock::new(users),
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Restore a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::with_users(snapshot.users);
        let cache = snapshot
            .cache
            .into_iter()
            .map(|(k, v)| (k, v.into_bytes()))
            .collect();
        Self {
            cache: RwLock::new(cache),
            ..store
        }
    }

    /// Capture the current contents.
    pub async fn snapshot(&self) -> Result<StoreSnapshot> {
        let users = self.users.read().await.values().cloned().collect();
        let mut cache = BTreeMap::new();
        for (key, value) in self.cache.read().await.iter() {
            let text = String::from_utf8(value.clone())
                .map_err(|_| Error::Storage(format!("Cached value {} is not UTF-8", key)))?;
            cache.insert(key.clone(), text);
        }
        Ok(StoreSnapshot { users, cache })
    }

    /// List every record, administrative accounts included.
    pub async fn records(&self) -> Vec<UserRecord> {
        self.users.read().await.values().cloned().collect()
    }

    /// Delete a user record. Returns the removed record if it existed.
    pub async fn remove_user(&self, id: &UserId) -> Option<UserRecord> {
        self.users.write().await.remove(id)
    }
}

impl UserStore for MemoryStore {
    async fn all_users(&self) -> Result<Vec<UserRecord>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.is_network_member())
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn put_user(&self, user: &UserRecord) -> Result<()> {
        self.users
            .write()
            .await
            .insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_cached(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.read().await.get(key).cloned())
    }

    async fn put_cached(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.cache.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_cached(&self, key: &str) -> Result<()> {
        self.cache.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn user_roundtrip() {
        let store = MemoryStore::new();
        let user = UserRecord::sponsored_by("bob", "alice");

        store.put_user(&user).await.unwrap();
        let loaded = store.get_user(&UserId::from("bob")).await.unwrap().unwrap();
        assert_eq!(user, loaded);
    }

    #[tokio::test]
    async fn all_users_skips_admins() {
        let store = MemoryStore::with_users([
            UserRecord::new("alice"),
            UserRecord::admin("ops"),
            UserRecord::sponsored_by("bob", "alice"),
        ]);

        let users = store.all_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.id.as_str() != "ops"));
        assert_eq!(store.records().await.len(), 3);
    }

    #[tokio::test]
    async fn cached_values() {
        let store = MemoryStore::new();

        assert!(store.get_cached("rank:a").await.unwrap().is_none());
        store.put_cached("rank:a", b"3".to_vec()).await.unwrap();
        assert_eq!(store.get_cached("rank:a").await.unwrap(), Some(b"3".to_vec()));

        store.delete_cached("rank:a").await.unwrap();
        store.delete_cached("rank:a").await.unwrap();
        assert!(store.get_cached("rank:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("network.json");

        let store = MemoryStore::with_users([
            UserRecord::new("alice"),
            UserRecord::sponsored_by("bob", "alice"),
        ]);
        store.put_cached("rank:alice", b"1".to_vec()).await.unwrap();
        store.snapshot().await.unwrap().write_to(&path).unwrap();

        let restored = MemoryStore::from_snapshot(StoreSnapshot::read_from(&path).unwrap());
        assert_eq!(restored.records().await, store.records().await);
        assert_eq!(
            restored.get_cached("rank:alice").await.unwrap(),
            Some(b"1".to_vec())
        );
    }

    #[test]
    fn missing_snapshot_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = StoreSnapshot::read_from(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
