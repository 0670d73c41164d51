//! Filtered and sorted projection.

use super::collection::KeyValueCollection;
use super::comparer::{KeyValueComparer, SearchResult};
use super::sorter::SortedChangeSet;
use crate::cache::ChangeAwareCache;
use crate::changes::{Change, ChangeReason, ChangeSet};
use crate::error::{CacheError, Result};
use crate::types::{CacheKey, CacheValue, SortOptimisations, SortReason};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Caller-supplied filter over values.
pub type Predicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Result of one filtered pass: the new sorted list and the changes that
/// turn the previous list into it.
pub struct FilterResult<K, V> {
    pub items: Vec<(K, V)>,
    pub changes: ChangeSet<K, V>,
}

/// Diffs the previously published filtered list against the set of items
/// currently passing the filter.
pub struct FilteredIndexCalculator<K, V> {
    comparer: KeyValueComparer<K, V>,
}

impl<K: CacheKey, V: CacheValue> FilteredIndexCalculator<K, V> {
    pub fn new(comparer: KeyValueComparer<K, V>) -> Self {
        Self { comparer }
    }

    pub fn comparer(&self) -> &KeyValueComparer<K, V> {
        &self.comparer
    }

    /// Remove every previous entry, then add every current entry in order.
    /// Used for the first pass and after a comparer change.
    pub fn rebuild(&self, current: &ChangeAwareCache<K, V>, previous: &[(K, V)]) -> FilterResult<K, V> {
        let mut changes = ChangeSet::with_capacity(previous.len() + current.count());
        // Removing from the back keeps the remaining indices stable.
        for (index, (k, v)) in previous.iter().enumerate().rev() {
            changes.push(Change::remove(k.clone(), v.clone()).at(index));
        }

        let mut items = current.key_values();
        self.comparer.sort(&mut items);
        for (index, (k, v)) in items.iter().enumerate() {
            changes.push(Change::add(k.clone(), v.clone()).at(index));
        }

        FilterResult { items, changes }
    }

    /// Incremental pass.
    ///
    /// `current` holds the items passing the filter now, `previous` the list
    /// published last time, and `source` the upstream changes of this batch,
    /// needed for items that stayed in the filter but changed.
    pub fn calculate(
        &self,
        current: &ChangeAwareCache<K, V>,
        previous: &[(K, V)],
        source: &ChangeSet<K, V>,
    ) -> Result<FilterResult<K, V>> {
        let previous_keys: HashSet<&K> = previous.iter().map(|(k, _)| k).collect();

        let removes: Vec<(K, V)> = previous
            .iter()
            .filter(|(k, _)| !current.contains_key(k))
            .cloned()
            .collect();
        let mut adds: Vec<(K, V)> = current
            .iter()
            .filter(|(k, _)| !previous_keys.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.comparer.sort(&mut adds);

        let in_both: HashSet<K> = previous
            .iter()
            .filter(|(k, _)| current.contains_key(k))
            .map(|(k, _)| k.clone())
            .collect();

        let mut working = previous.to_vec();
        let mut changes = ChangeSet::new();

        for (key, value) in removes {
            let index = self.locate(&working, &key, &value)?;
            working.remove(index);
            changes.push(Change::remove(key, value).at(index));
        }

        for (key, value) in adds {
            let index = self.insert_position(&working, &key, &value)?;
            working.insert(index, (key.clone(), value.clone()));
            changes.push(Change::add(key, value).at(index));
        }

        // Items that left and re-entered within the batch show up here as a
        // Remove/Add pair; they are reconciled with their current value below.
        let replaced: HashSet<&K> = source
            .iter()
            .filter(|c| in_both.contains(&c.key))
            .filter(|c| matches!(c.reason, ChangeReason::Add | ChangeReason::Remove))
            .map(|c| &c.key)
            .collect();

        let mut refreshes = Vec::new();
        for change in source.iter().filter(|c| in_both.contains(&c.key)) {
            if replaced.contains(&change.key) {
                continue;
            }
            match change.reason {
                ChangeReason::Update => {
                    let old = match &change.previous {
                        Some(previous) => self.locate(&working, &change.key, previous)?,
                        None => position_by_key(&working, &change.key)?,
                    };
                    working.remove(old);
                    let index = self.insert_position(&working, &change.key, &change.current)?;
                    working.insert(index, (change.key.clone(), change.current.clone()));
                    changes.push(Change {
                        current_index: Some(index),
                        previous_index: Some(old),
                        ..change.clone()
                    });
                }
                ChangeReason::Moved => {
                    let old = position_by_key(&working, &change.key)?;
                    let entry = working.remove(old);
                    let index = self.insert_position(&working, &entry.0, &entry.1)?;
                    working.insert(index, entry);
                    if index != old {
                        changes.push(Change::moved(
                            change.key.clone(),
                            change.current.clone(),
                            index,
                            old,
                        ));
                    }
                }
                ChangeReason::Refresh => {
                    let mut refresh = Change::refresh(change.key.clone(), change.current.clone());
                    if let Some(index) = working.iter().position(|(k, _)| *k == change.key) {
                        working[index].1 = change.current.clone();
                        refresh = refresh.at(index);
                    }
                    changes.push(refresh);
                    refreshes.push(change);
                }
                ChangeReason::Add | ChangeReason::Remove => {}
            }
        }

        let mut replaced: Vec<&K> = replaced.into_iter().collect();
        replaced.sort();
        for key in replaced {
            let Some(value) = current.lookup(key) else {
                continue;
            };
            let old = position_by_key(&working, key)?;
            let (_, previous) = working.remove(old);
            let index = self.insert_position(&working, key, value)?;
            working.insert(index, (key.clone(), value.clone()));
            changes.push(Change::update(key.clone(), value.clone(), previous).at(index).from_index(old));
        }

        refreshes.sort_by(|a, b| self.comparer.compare((&b.key, &b.current), (&a.key, &a.current)));
        for change in refreshes {
            let Some(old) = working.iter().position(|(k, _)| *k == change.key) else {
                continue;
            };
            let value = working[old].1.clone();
            let mut index = self.comparer.linear_insert_position(&working, &change.key, &value);
            if old < index {
                index -= 1;
            }
            if old == index {
                continue;
            }
            let entry = working.remove(old);
            working.insert(index, entry);
            changes.push(Change::moved(change.key.clone(), value, index, old));
        }

        Ok(FilterResult {
            items: working,
            changes,
        })
    }

    /// Exact position of an entry, by binary search with a linear fallback
    /// for lists disturbed by in-place mutation.
    fn locate(&self, list: &[(K, V)], key: &K, value: &V) -> Result<usize> {
        match self.comparer.search(list, key, value) {
            SearchResult::Found(index) if list[index].0 == *key => Ok(index),
            _ => position_by_key(list, key),
        }
    }

    fn insert_position(&self, list: &[(K, V)], key: &K, value: &V) -> Result<usize> {
        match self.comparer.search(list, key, value) {
            SearchResult::InsertAt(index) => Ok(index),
            SearchResult::Found(_) => Err(CacheError::NotUnique(format!("{:?}", key))),
        }
    }
}

fn position_by_key<K: PartialEq + std::fmt::Debug, V>(list: &[(K, V)], key: &K) -> Result<usize> {
    list.iter()
        .position(|(k, _)| k == key)
        .ok_or_else(|| CacheError::ItemNotFound(format!("{:?}", key)))
}

/// Maintains a filtered, sorted view of an upstream change-set stream.
pub struct FilteredSorter<K, V> {
    all: ChangeAwareCache<K, V>,
    passing: ChangeAwareCache<K, V>,
    predicate: Predicate<V>,
    calculator: FilteredIndexCalculator<K, V>,
    items: Vec<(K, V)>,
    loaded: bool,
}

impl<K: CacheKey, V: CacheValue> FilteredSorter<K, V> {
    pub fn new<F>(predicate: F, comparer: KeyValueComparer<K, V>) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        Self {
            all: ChangeAwareCache::new(),
            passing: ChangeAwareCache::new(),
            predicate: Arc::new(predicate),
            calculator: FilteredIndexCalculator::new(comparer),
            items: Vec::new(),
            loaded: false,
        }
    }

    /// The current filtered, sorted items.
    pub fn items(&self) -> &[(K, V)] {
        &self.items
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Process an upstream change-set.
    pub fn process(&mut self, changes: &ChangeSet<K, V>) -> Result<Option<SortedChangeSet<K, V>>> {
        self.all.clone_changes(changes);
        let captured = self.all.capture_changes();
        for change in &captured {
            self.apply_membership(change);
        }
        self.passing.capture_changes();

        if !self.loaded {
            self.loaded = true;
            let result = self.calculator.rebuild(&self.passing, &self.items);
            return Ok(self.publish(result, SortReason::InitialLoad));
        }

        let result = self.calculator.calculate(&self.passing, &self.items, &captured)?;
        Ok(self.publish(result, SortReason::DataChanged))
    }

    /// Swap the predicate and re-filter everything.
    pub fn change_filter<F>(&mut self, predicate: F) -> Result<Option<SortedChangeSet<K, V>>>
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        for (key, value) in self.all.iter() {
            if (self.predicate)(value) {
                if !self.passing.contains_key(key) {
                    self.passing.add_or_update(key.clone(), value.clone());
                }
            } else {
                self.passing.remove(key);
            }
        }
        self.passing.capture_changes();

        let result = self
            .calculator
            .calculate(&self.passing, &self.items, &ChangeSet::new())?;
        Ok(self.publish(result, SortReason::DataChanged))
    }

    /// Swap the comparer and rebuild the list.
    pub fn change_comparer(&mut self, comparer: KeyValueComparer<K, V>) -> Option<SortedChangeSet<K, V>> {
        self.calculator = FilteredIndexCalculator::new(comparer);
        let result = self.calculator.rebuild(&self.passing, &self.items);
        self.publish(result, SortReason::ComparerChanged)
    }

    fn apply_membership(&mut self, change: &Change<K, V>) {
        match change.reason {
            ChangeReason::Add | ChangeReason::Update | ChangeReason::Refresh => {
                if (self.predicate)(&change.current) {
                    self.passing.add_or_update(change.key.clone(), change.current.clone());
                } else {
                    self.passing.remove(&change.key);
                }
            }
            ChangeReason::Remove => {
                self.passing.remove(&change.key);
            }
            ChangeReason::Moved => {}
        }
    }

    fn publish(&mut self, result: FilterResult<K, V>, reason: SortReason) -> Option<SortedChangeSet<K, V>> {
        self.items = result.items;
        if result.changes.is_empty() {
            return None;
        }
        trace!(?reason, changes = result.changes.len(), "publishing filtered change-set");
        Some(SortedChangeSet {
            changes: result.changes,
            sorted_items: KeyValueCollection::new(
                self.items.clone(),
                self.calculator.comparer().clone(),
                reason,
                SortOptimisations::default(),
            ),
        })
    }
}
