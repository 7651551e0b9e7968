//! Per-key async locks

use crate::models::IndexKey;
use dashmap::DashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Lazily created async mutex per key; guards are owned so they can outlive the borrow
pub struct LockRegistry<K: Eq + Hash + Clone> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Clone for LockRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

impl<K: Eq + Hash + Clone> Default for LockRegistry<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> LockRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for the lock of `key`
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Take the lock of `key` only if nobody holds it
    pub fn try_acquire(&self, key: &K) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(key).try_lock_owned().ok()
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .get(key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}

/// Lazily created async read-write lock per key
pub struct SharedLockRegistry<K: Eq + Hash + Clone> {
    locks: Arc<DashMap<K, Arc<RwLock<()>>>>,
}

impl<K: Eq + Hash + Clone> Clone for SharedLockRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

impl<K: Eq + Hash + Clone> Default for SharedLockRegistry<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> SharedLockRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &K) -> Arc<RwLock<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn read(&self, key: &K) -> OwnedRwLockReadGuard<()> {
        self.lock_for(key).read_owned().await
    }

    pub async fn write(&self, key: &K) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(key).write_owned().await
    }

    pub fn try_write(&self, key: &K) -> Option<OwnedRwLockWriteGuard<()>> {
        self.lock_for(key).try_write_owned().ok()
    }
}

/// Held by a regeneration from preparation through catch-up
pub type IndexLockRegistry = LockRegistry<IndexKey>;

/// Shared by syncs writing into the live generation, exclusive for promotion
pub type LiveLockRegistry = SharedLockRegistry<IndexKey>;

/// Serializes writers opened on the same generation directory
pub type WriterLockRegistry = LockRegistry<PathBuf>;
