//! Incremental maintenance of one sorted projection.
//!
//! The calculator owns the sorted list and turns each incoming change-set
//! into a positional one. Indices in the output reflect every earlier entry
//! of the same output, so an observer replaying the changes in order ends up
//! with exactly the calculator's list.
//!
//! Refresh changes are resolved last. A refreshed value may have mutated in
//! place, so the list around it is not guaranteed to be sorted and binary
//! search cannot be trusted; they are placed by a linear scan instead, in
//! descending comparer order.

use super::comparer::{KeyValueComparer, SearchResult};
use crate::cache::ChangeAwareCache;
use crate::changes::{Change, ChangeReason, ChangeSet};
use crate::error::{CacheError, Result};
use crate::types::{CacheKey, CacheValue, SortOptimisations};

pub struct SortedIndexCalculator<K, V> {
    list: Vec<(K, V)>,
    comparer: KeyValueComparer<K, V>,
    optimisations: SortOptimisations,
    loaded: bool,
}

impl<K: CacheKey, V: CacheValue> SortedIndexCalculator<K, V> {
    pub fn new(comparer: KeyValueComparer<K, V>, optimisations: SortOptimisations) -> Self {
        Self {
            list: Vec::new(),
            comparer,
            optimisations,
            loaded: false,
        }
    }

    /// The maintained list.
    pub fn list(&self) -> &[(K, V)] {
        &self.list
    }

    pub fn comparer(&self) -> &KeyValueComparer<K, V> {
        &self.comparer
    }

    pub fn optimisations(&self) -> SortOptimisations {
        self.optimisations
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Bulk-sort the whole cache and emit one Add per entry at its index.
    pub fn load(&mut self, cache: &ChangeAwareCache<K, V>) -> ChangeSet<K, V> {
        self.rebuild(cache);
        self.list
            .iter()
            .enumerate()
            .map(|(index, (k, v))| Change::add(k.clone(), v.clone()).at(index))
            .collect()
    }

    /// Discard the list and rebuild it from the cache. Emits nothing.
    pub fn reset(&mut self, cache: &ChangeAwareCache<K, V>) {
        self.rebuild(cache);
    }

    /// Swap the comparer. The list is left as is until `reorder`.
    pub fn change_comparer(&mut self, comparer: KeyValueComparer<K, V>) {
        self.comparer = comparer;
    }

    /// Re-sort under the current comparer, emitting a Moved change for every
    /// entry whose position actually changed.
    pub fn reorder(&mut self) -> Result<ChangeSet<K, V>> {
        self.ensure_loaded()?;

        let mut result = ChangeSet::new();
        if self.optimisations.ignore_evaluates {
            self.comparer.sort(&mut self.list);
            return Ok(result);
        }

        let mut sorted = self.list.clone();
        self.comparer.sort(&mut sorted);

        for (index, (key, value)) in sorted.into_iter().enumerate() {
            // Everything before `index` already matches the sorted order.
            if self.list[index].0 == key {
                continue;
            }
            let old = self.position_by_key(&key)?;
            let entry = self.list.remove(old);
            self.list.insert(index, entry);
            result.push(Change::moved(key, value, index, old));
        }

        Ok(result)
    }

    /// Apply a change-set incrementally.
    pub fn calculate(&mut self, changes: &ChangeSet<K, V>) -> Result<ChangeSet<K, V>> {
        self.ensure_loaded()?;

        let mut result = ChangeSet::with_capacity(changes.len());
        let mut refreshes = Vec::new();

        for change in changes {
            match change.reason {
                ChangeReason::Add => {
                    let position = self.insert_position(&change.key, &change.current)?;
                    self.list
                        .insert(position, (change.key.clone(), change.current.clone()));
                    result.push(Change::add(change.key.clone(), change.current.clone()).at(position));
                }
                ChangeReason::Update => {
                    let old = self.current_position(&change.key, change.previous.as_ref())?;
                    self.list.remove(old);

                    let position = self.insert_position(&change.key, &change.current)?;
                    self.list
                        .insert(position, (change.key.clone(), change.current.clone()));

                    result.push(
                        Change {
                            current_index: Some(position),
                            previous_index: Some(old),
                            ..change.clone()
                        },
                    );
                }
                ChangeReason::Remove => {
                    let position = self.current_position(&change.key, Some(&change.current))?;
                    self.list.remove(position);
                    result.push(Change::remove(change.key.clone(), change.current.clone()).at(position));
                }
                ChangeReason::Moved => {
                    let old = self.position_by_key(&change.key)?;
                    self.list.remove(old);
                    let position = self.insert_position(&change.key, &change.current)?;
                    self.list
                        .insert(position, (change.key.clone(), change.current.clone()));
                    if position != old {
                        result.push(Change::moved(
                            change.key.clone(),
                            change.current.clone(),
                            position,
                            old,
                        ));
                    }
                }
                ChangeReason::Refresh => {
                    let mut refresh = Change::refresh(change.key.clone(), change.current.clone());
                    if let Some(position) = self.list.iter().position(|(k, _)| *k == change.key) {
                        self.list[position].1 = change.current.clone();
                        refresh = refresh.at(position);
                    }
                    result.push(refresh);
                    refreshes.push(change);
                }
            }
        }

        if !refreshes.is_empty() {
            if self.optimisations.ignore_evaluates {
                self.comparer.sort(&mut self.list);
            } else {
                self.resolve_refreshes(refreshes, &mut result);
            }
        }

        Ok(result)
    }

    /// Place refreshed entries by linear scan, largest first.
    fn resolve_refreshes(&mut self, mut refreshes: Vec<&Change<K, V>>, result: &mut ChangeSet<K, V>) {
        let comparer = self.comparer.clone();
        refreshes.sort_by(|a, b| comparer.compare((&b.key, &b.current), (&a.key, &a.current)));

        for change in refreshes {
            let Some(old) = self.list.iter().position(|(k, _)| *k == change.key) else {
                continue;
            };

            // Later changes in the batch may have replaced the refreshed value.
            let value = self.list[old].1.clone();
            let mut position = comparer.linear_insert_position(&self.list, &change.key, &value);
            if old < position {
                position -= 1;
            }
            if old == position {
                continue;
            }

            let entry = self.list.remove(old);
            self.list.insert(position, entry);
            result.push(Change::moved(change.key.clone(), value, position, old));
        }
    }

    fn rebuild(&mut self, cache: &ChangeAwareCache<K, V>) {
        self.list = cache.key_values();
        self.comparer.sort(&mut self.list);
        self.loaded = true;
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(CacheError::NotLoaded)
        }
    }

    /// Where a new entry goes. The entry must not already be in the list.
    fn insert_position(&self, key: &K, value: &V) -> Result<usize> {
        match self.comparer.search(&self.list, key, value) {
            SearchResult::InsertAt(index) => Ok(index),
            SearchResult::Found(_) => Err(CacheError::NotUnique(format!("{:?}", key))),
        }
    }

    /// Where an existing entry currently sits.
    fn current_position(&self, key: &K, value: Option<&V>) -> Result<usize> {
        match value {
            Some(value) if self.optimisations.compares_immutable_values_only => {
                match self.comparer.search(&self.list, key, value) {
                    SearchResult::Found(index) => Ok(index),
                    SearchResult::InsertAt(_) => Err(CacheError::ItemNotFound(format!("{:?}", key))),
                }
            }
            _ => self.position_by_key(key),
        }
    }

    fn position_by_key(&self, key: &K) -> Result<usize> {
        self.list
            .iter()
            .position(|(k, _)| k == key)
            .ok_or_else(|| CacheError::ItemNotFound(format!("{:?}", key)))
    }
}
