//! Ordered batch of changes.
//!
//! A ChangeSet is applied in sequence order: index fields on later entries
//! assume earlier entries have already been applied.

use super::change::{Change, ChangeReason};
use serde::{Deserialize, Serialize};

/// The changes produced by one mutation cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet<K, V> {
    changes: Vec<Change<K, V>>,
}

impl<K, V> ChangeSet<K, V> {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            changes: Vec::with_capacity(capacity),
        }
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the total number of changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    pub fn push(&mut self, change: Change<K, V>) {
        self.changes.push(change);
    }

    /// Appends another change set after this one.
    pub fn merge(&mut self, other: ChangeSet<K, V>) {
        self.changes.extend(other.changes);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change<K, V>> {
        self.changes.iter()
    }

    pub fn as_slice(&self) -> &[Change<K, V>] {
        &self.changes
    }

    pub fn count_of(&self, reason: ChangeReason) -> usize {
        self.changes.iter().filter(|c| c.reason == reason).count()
    }

    pub fn adds(&self) -> usize {
        self.count_of(ChangeReason::Add)
    }

    pub fn updates(&self) -> usize {
        self.count_of(ChangeReason::Update)
    }

    pub fn removes(&self) -> usize {
        self.count_of(ChangeReason::Remove)
    }

    pub fn refreshes(&self) -> usize {
        self.count_of(ChangeReason::Refresh)
    }

    pub fn moves(&self) -> usize {
        self.count_of(ChangeReason::Moved)
    }
}

impl<K, V> Default for ChangeSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> From<Vec<Change<K, V>>> for ChangeSet<K, V> {
    fn from(changes: Vec<Change<K, V>>) -> Self {
        Self { changes }
    }
}

impl<K, V> FromIterator<Change<K, V>> for ChangeSet<K, V> {
    fn from_iter<I: IntoIterator<Item = Change<K, V>>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

impl<K, V> IntoIterator for ChangeSet<K, V> {
    type Item = Change<K, V>;
    type IntoIter = std::vec::IntoIter<Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a ChangeSet<K, V> {
    type Item = &'a Change<K, V>;
    type IntoIter = std::slice::Iter<'a, Change<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
