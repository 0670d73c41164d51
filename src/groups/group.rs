//! A single group of items sharing a group key.

use crate::cache::ChangeAwareCache;
use crate::changes::ChangeSet;
use crate::types::{CacheKey, CacheValue};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct GroupInner<K, V, G> {
    key: G,
    cache: RwLock<ChangeAwareCache<K, V>>,
    disposed: AtomicBool,
}

/// Read-only handle to a group owned by a [`GroupManager`](super::GroupManager).
///
/// Handles stay valid after the group is disposed; they then report the
/// contents at disposal time (always empty) and `is_disposed() == true`.
pub struct Group<K, V, G> {
    inner: Arc<GroupInner<K, V, G>>,
}

impl<K: CacheKey, V: CacheValue, G: CacheKey> Group<K, V, G> {
    pub(crate) fn new(key: G) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                key,
                cache: RwLock::new(ChangeAwareCache::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn key(&self) -> &G {
        &self.inner.key
    }

    pub fn count(&self) -> usize {
        self.inner.cache.read().count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.read().is_empty()
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.inner.cache.read().lookup(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.cache.read().contains_key(key)
    }

    /// Keys of the members, in ascending order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.inner.cache.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn key_values(&self) -> Vec<(K, V)> {
        self.inner.cache.read().key_values()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Run a mutation against the member store.
    pub(crate) fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ChangeAwareCache<K, V>),
    {
        f(&mut self.inner.cache.write());
    }

    pub(crate) fn capture_changes(&self) -> ChangeSet<K, V> {
        self.inner.cache.write().capture_changes()
    }

    pub(crate) fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
    }
}

impl<K, V, G> Clone for Group<K, V, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, G> PartialEq for Group<K, V, G> {
    /// Handles are equal when they refer to the same group instance.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V, G: fmt::Debug> fmt::Debug for Group<K, V, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.inner.key)
            .field("disposed", &self.inner.disposed.load(Ordering::Acquire))
            .finish()
    }
}
