//! Store wrappers for exercising failure paths.

use crate::error::{Error, Result};
use crate::models::{UserId, UserRecord};
use crate::store::{MemoryStore, UserStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Wraps a [`MemoryStore`], counting scans and injecting failures on demand.
#[derive(Debug, Default)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    scans: AtomicUsize,
    fail_scans: AtomicBool,
    fail_cache_writes: AtomicBool,
    fail_user_writes: AtomicBool,
    fail_get: Mutex<Option<UserId>>,
}

impl CountingStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(crate) fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub(crate) fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_cache_writes(&self, fail: bool) {
        self.fail_cache_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_user_writes(&self, fail: bool) {
        self.fail_user_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_get_user(&self, id: Option<&str>) {
        *self.fail_get.lock().unwrap() = id.map(UserId::from);
    }
}

impl UserStore for CountingStore {
    async fn all_users(&self) -> Result<Vec<UserRecord>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(Error::Storage("scan unavailable".into()));
        }
        self.inner.all_users().await
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
        let fail = self.fail_get.lock().unwrap().as_ref() == Some(id);
        if fail {
            return Err(Error::Storage(format!("read of {} failed", id)));
        }
        self.inner.get_user(id).await
    }

    async fn put_user(&self, user: &UserRecord) -> Result<()> {
        if self.fail_user_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("user write rejected".into()));
        }
        self.inner.put_user(user).await
    }

    async fn get_cached(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_cached(key).await
    }

    async fn put_cached(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.fail_cache_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("cache write rejected".into()));
        }
        self.inner.put_cached(key, value).await
    }

    async fn delete_cached(&self, key: &str) -> Result<()> {
        self.inner.delete_cached(key).await
    }
}
