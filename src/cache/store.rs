//! Keyed store that records every mutation into a pending change-set.

use crate::changes::{Change, ChangeReason, ChangeSet};
use crate::error::{CacheError, Result};
use crate::types::{CacheKey, CacheValue};
use std::collections::HashMap;

/// Keyed map plus a buffer of the changes applied since the last capture.
///
/// The map always reflects every change captured so far plus every change
/// applied since. A captured buffer is handed out once and never replayed.
#[derive(Clone, Debug)]
pub struct ChangeAwareCache<K, V> {
    data: HashMap<K, V>,
    changes: ChangeSet<K, V>,
}

impl<K: CacheKey, V: CacheValue> ChangeAwareCache<K, V> {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            changes: ChangeSet::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: HashMap::with_capacity(capacity),
            changes: ChangeSet::new(),
        }
    }

    /// Insert a key that must not already be present.
    pub fn add(&mut self, key: K, value: V) -> Result<()> {
        if self.data.contains_key(&key) {
            return Err(CacheError::DuplicateKey(format!("{:?}", key)));
        }
        self.changes.push(Change::add(key.clone(), value.clone()));
        self.data.insert(key, value);
        Ok(())
    }

    /// Add if absent, Update (recording the replaced value) if present.
    pub fn add_or_update(&mut self, key: K, value: V) {
        match self.data.insert(key.clone(), value.clone()) {
            Some(previous) => self.changes.push(Change::update(key, value, previous)),
            None => self.changes.push(Change::add(key, value)),
        }
    }

    /// Remove a key. Absent keys are ignored.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.data.remove(key)?;
        self.changes.push(Change::remove(key.clone(), removed.clone()));
        Some(removed)
    }

    /// Announce a Refresh for a present key. Absent keys are ignored.
    pub fn refresh(&mut self, key: &K) -> bool {
        match self.data.get(key) {
            Some(value) => {
                self.changes.push(Change::refresh(key.clone(), value.clone()));
                true
            }
            None => false,
        }
    }

    pub fn refresh_all(&mut self) {
        for (key, value) in &self.data {
            self.changes.push(Change::refresh(key.clone(), value.clone()));
        }
    }

    /// Remove every entry, recording one Remove each.
    pub fn clear(&mut self) {
        for (key, value) in self.data.drain() {
            self.changes.push(Change::remove(key, value));
        }
    }

    /// Replay an upstream change-set into this store.
    ///
    /// Moved changes carry no keyed information and are ignored.
    pub fn clone_changes(&mut self, changes: &ChangeSet<K, V>) {
        for change in changes {
            match change.reason {
                ChangeReason::Add | ChangeReason::Update => {
                    self.add_or_update(change.key.clone(), change.current.clone())
                }
                ChangeReason::Remove => {
                    self.remove(&change.key);
                }
                ChangeReason::Refresh => {
                    self.refresh(&change.key);
                }
                ChangeReason::Moved => {}
            }
        }
    }

    /// Drain the pending buffer.
    pub fn capture_changes(&mut self) -> ChangeSet<K, V> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.data.iter()
    }

    /// Point-in-time snapshot of the contents.
    pub fn key_values(&self) -> Vec<(K, V)> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// A change-set of Adds describing the current contents.
    pub fn as_initial_changes(&self) -> ChangeSet<K, V> {
        self.data
            .iter()
            .map(|(k, v)| Change::add(k.clone(), v.clone()))
            .collect()
    }
}

impl<K: CacheKey, V: CacheValue> Default for ChangeAwareCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_or_update_records_previous() {
        let mut cache = ChangeAwareCache::new();
        cache.add_or_update("a", 1);
        cache.add_or_update("a", 2);

        let changes = cache.capture_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.as_slice()[0], Change::add("a", 1));
        assert_eq!(changes.as_slice()[1], Change::update("a", 2, 1));
        assert_eq!(cache.lookup(&"a"), Some(&2));
    }

    #[test]
    fn test_add_duplicate_fails() {
        let mut cache = ChangeAwareCache::new();
        cache.add("a", 1).unwrap();
        assert!(matches!(cache.add("a", 2), Err(CacheError::DuplicateKey(_))));
        assert_eq!(cache.capture_changes().len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cache: ChangeAwareCache<&str, i32> = ChangeAwareCache::new();
        assert_eq!(cache.remove(&"missing"), None);
        assert!(cache.capture_changes().is_empty());
    }

    #[test]
    fn test_refresh_only_when_present() {
        let mut cache = ChangeAwareCache::new();
        cache.add_or_update("a", 1);
        cache.capture_changes();

        assert!(cache.refresh(&"a"));
        assert!(!cache.refresh(&"b"));

        let changes = cache.capture_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.refreshes(), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut cache = ChangeAwareCache::new();
        cache.add_or_update(1, "x");
        cache.add_or_update(2, "y");
        cache.capture_changes();

        cache.clear();
        let changes = cache.capture_changes();
        assert_eq!(changes.removes(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_second_capture_is_empty() {
        let mut cache = ChangeAwareCache::new();
        cache.add_or_update(1, "x");
        assert_eq!(cache.capture_changes().len(), 1);
        assert!(cache.capture_changes().is_empty());
    }

    #[test]
    fn test_clone_changes_normalizes() {
        let mut upstream = ChangeAwareCache::new();
        upstream.add_or_update("a", 1);
        upstream.add_or_update("b", 2);
        let first = upstream.capture_changes();

        let mut mirror = ChangeAwareCache::new();
        mirror.clone_changes(&first);
        assert_eq!(mirror.capture_changes().adds(), 2);

        // An Add for a key the mirror already holds becomes an Update.
        let replay: ChangeSet<&str, i32> = vec![Change::add("a", 5), Change::remove("z", 0)].into();
        mirror.clone_changes(&replay);
        let changes = mirror.capture_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.as_slice()[0], Change::update("a", 5, 1));
    }
}
