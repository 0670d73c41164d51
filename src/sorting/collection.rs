//! Published, sorted snapshot of a projection.

use super::comparer::{KeyValueComparer, SearchResult};
use crate::types::{SortOptimisations, SortReason};
use std::sync::Arc;

/// An immutable, sorted list of key/value pairs together with the comparer
/// and the reason of the sort pass that produced it.
///
/// Cloning shares the underlying list.
#[derive(Debug)]
pub struct KeyValueCollection<K, V> {
    items: Arc<Vec<(K, V)>>,
    comparer: KeyValueComparer<K, V>,
    sort_reason: SortReason,
    optimisations: SortOptimisations,
}

impl<K: Ord, V> KeyValueCollection<K, V> {
    pub fn new(
        items: Vec<(K, V)>,
        comparer: KeyValueComparer<K, V>,
        sort_reason: SortReason,
        optimisations: SortOptimisations,
    ) -> Self {
        Self {
            items: Arc::new(items),
            comparer,
            sort_reason,
            optimisations,
        }
    }

    pub fn empty(comparer: KeyValueComparer<K, V>) -> Self {
        Self::new(
            Vec::new(),
            comparer,
            SortReason::InitialLoad,
            SortOptimisations::default(),
        )
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&(K, V)> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (K, V)> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[(K, V)] {
        &self.items
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.items.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.items.iter().map(|(_, v)| v)
    }

    pub fn comparer(&self) -> &KeyValueComparer<K, V> {
        &self.comparer
    }

    pub fn sort_reason(&self) -> SortReason {
        self.sort_reason
    }

    pub fn optimisations(&self) -> SortOptimisations {
        self.optimisations
    }

    /// Binary search for an entry.
    pub fn binary_search(&self, key: &K, value: &V) -> SearchResult {
        self.comparer.search(&self.items, key, value)
    }

    /// Linear search by key.
    pub fn position_of(&self, key: &K) -> Option<usize> {
        self.items.iter().position(|(k, _)| k == key)
    }

    /// Copy of the list, for callers that need to edit a working copy.
    pub fn to_vec(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.items.as_ref().clone()
    }
}

impl<K, V> Clone for KeyValueCollection<K, V> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            comparer: self.comparer.clone(),
            sort_reason: self.sort_reason,
            optimisations: self.optimisations,
        }
    }
}
