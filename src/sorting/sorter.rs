//! Driving layer for the sort calculator.

use super::calculator::SortedIndexCalculator;
use super::collection::KeyValueCollection;
use super::comparer::KeyValueComparer;
use crate::cache::ChangeAwareCache;
use crate::changes::{Change, ChangeSet};
use crate::config::SortConfig;
use crate::error::{CacheError, Result};
use crate::types::{CacheKey, CacheValue, SortReason};
use tracing::{debug, trace};

/// What triggered a sort pass.
pub enum SortInput<K, V> {
    /// Upstream data changes.
    Data(ChangeSet<K, V>),
    /// A new comparer.
    Comparer(KeyValueComparer<K, V>),
    /// Explicit re-sort of the held list.
    Resort,
}

/// A positional change-set together with the sorted list it produces.
#[derive(Clone, Debug)]
pub struct SortedChangeSet<K, V> {
    pub changes: ChangeSet<K, V>,
    pub sorted_items: KeyValueCollection<K, V>,
}

impl<K: Ord, V> SortedChangeSet<K, V> {
    pub fn sort_reason(&self) -> SortReason {
        self.sorted_items.sort_reason()
    }
}

/// Chooses the sort path for each input and publishes the result.
///
/// Keeps its own mirror of the upstream cache so it can load or rebuild the
/// projection at any time, including for data that arrived before any
/// comparer was set.
pub struct Sorter<K, V> {
    cache: ChangeAwareCache<K, V>,
    comparer: Option<KeyValueComparer<K, V>>,
    calculator: Option<SortedIndexCalculator<K, V>>,
    config: SortConfig,
    received_data: bool,
    sorted: Option<KeyValueCollection<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Sorter<K, V> {
    pub fn new(comparer: Option<KeyValueComparer<K, V>>, config: SortConfig) -> Self {
        Self {
            cache: ChangeAwareCache::new(),
            comparer,
            calculator: None,
            config,
            received_data: false,
            sorted: None,
        }
    }

    /// The last published sorted list.
    pub fn sorted(&self) -> Option<&KeyValueCollection<K, V>> {
        self.sorted.as_ref()
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// The current state as an Add-only sorted change-set, for subscribers
    /// that connect after the first pass.
    pub fn snapshot(&self) -> Option<SortedChangeSet<K, V>> {
        let sorted = self.sorted.as_ref()?;
        let changes: ChangeSet<K, V> = sorted
            .iter()
            .enumerate()
            .map(|(index, (k, v))| Change::add(k.clone(), v.clone()).at(index))
            .collect();
        Some(SortedChangeSet {
            changes,
            sorted_items: KeyValueCollection::new(
                sorted.to_vec(),
                sorted.comparer().clone(),
                SortReason::InitialLoad,
                sorted.optimisations(),
            ),
        })
    }

    /// Run one sort pass. Returns `None` when there is nothing to publish.
    pub fn sort(&mut self, input: SortInput<K, V>) -> Result<Option<SortedChangeSet<K, V>>> {
        let (mut reason, changes) = match input {
            SortInput::Data(changes) => {
                self.cache.clone_changes(&changes);
                self.received_data = true;
                (SortReason::DataChanged, Some(self.cache.capture_changes()))
            }
            SortInput::Comparer(comparer) => {
                self.comparer = Some(comparer);
                (SortReason::ComparerChanged, None)
            }
            SortInput::Resort => {
                if self.comparer.is_none() {
                    return Err(CacheError::NoComparer);
                }
                (SortReason::Reorder, None)
            }
        };

        let Some(comparer) = self.comparer.clone() else {
            trace!("no comparer yet, buffering data");
            return Ok(None);
        };
        if !self.received_data {
            return Ok(None);
        }

        let incoming = changes.as_ref().map_or(0, |c| c.len());
        if self.calculator.is_none() {
            reason = SortReason::InitialLoad;
        } else if changes.is_some() && self.config.exceeds_threshold(incoming) {
            reason = SortReason::Reset;
        }

        let optimisations = self.config.optimisations;
        let calculator = self
            .calculator
            .get_or_insert_with(|| SortedIndexCalculator::new(comparer.clone(), optimisations));

        let result = match reason {
            SortReason::InitialLoad => {
                calculator.change_comparer(comparer.clone());
                calculator.load(&self.cache)
            }
            SortReason::Reset => {
                debug!(changes = incoming, "change-set reached reset threshold, rebuilding");
                calculator.reset(&self.cache);
                changes
                    .unwrap_or_default()
                    .into_iter()
                    .map(Change::unindexed)
                    .collect()
            }
            SortReason::DataChanged => match changes {
                Some(changes) => calculator.calculate(&changes)?,
                None => ChangeSet::new(),
            },
            SortReason::ComparerChanged => {
                calculator.change_comparer(comparer.clone());
                if self.config.exceeds_threshold(self.cache.count()) {
                    debug!(count = self.cache.count(), "comparer changed on large cache, rebuilding");
                    reason = SortReason::Reset;
                    calculator.reset(&self.cache);
                    ChangeSet::new()
                } else {
                    reason = SortReason::Reorder;
                    calculator.reorder()?
                }
            }
            SortReason::Reorder => calculator.reorder()?,
        };

        let suppress = matches!(
            reason,
            SortReason::InitialLoad | SortReason::DataChanged | SortReason::Reorder
        ) && result.is_empty();
        if suppress {
            trace!(?reason, "sort pass produced no changes");
            return Ok(None);
        }

        trace!(?reason, changes = result.len(), "publishing sorted change-set");
        let sorted = KeyValueCollection::new(
            calculator.list().to_vec(),
            comparer,
            reason,
            optimisations,
        );
        self.sorted = Some(sorted.clone());

        Ok(Some(SortedChangeSet {
            changes: result,
            sorted_items: sorted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeReason;

    fn by_value() -> KeyValueComparer<u32, i64> {
        KeyValueComparer::ascending_by(|v: &i64| *v)
    }

    fn data(pairs: &[(u32, i64)]) -> SortInput<u32, i64> {
        let changes: ChangeSet<u32, i64> = pairs.iter().map(|&(k, v)| Change::add(k, v)).collect();
        SortInput::Data(changes)
    }

    fn fresh_sort(sorter: &Sorter<u32, i64>) -> Vec<u32> {
        let mut items = sorter.cache.key_values();
        by_value().sort(&mut items);
        items.into_iter().map(|(k, _)| k).collect()
    }

    fn sorted_keys(sorted: &SortedChangeSet<u32, i64>) -> Vec<u32> {
        sorted.sorted_items.keys().copied().collect()
    }

    #[test]
    fn test_first_pass_is_initial_load() {
        let mut sorter = Sorter::new(Some(by_value()), SortConfig::default());
        let sorted = sorter.sort(data(&[(1, 30), (2, 10)])).unwrap().unwrap();
        assert_eq!(sorted.sort_reason(), SortReason::InitialLoad);
        assert_eq!(sorted_keys(&sorted), vec![2, 1]);
        assert_eq!(sorted.changes.adds(), 2);
    }

    #[test]
    fn test_data_before_comparer_is_buffered() {
        let mut sorter = Sorter::new(None, SortConfig::default());
        assert!(sorter.sort(data(&[(1, 30), (2, 10)])).unwrap().is_none());

        let sorted = sorter.sort(SortInput::Comparer(by_value())).unwrap().unwrap();
        assert_eq!(sorted.sort_reason(), SortReason::InitialLoad);
        assert_eq!(sorted_keys(&sorted), vec![2, 1]);
    }

    #[test]
    fn test_resort_without_comparer_fails() {
        let mut sorter: Sorter<u32, i64> = Sorter::new(None, SortConfig::default());
        assert!(matches!(
            sorter.sort(SortInput::Resort),
            Err(CacheError::NoComparer)
        ));
    }

    #[test]
    fn test_large_batch_resets() {
        let config = SortConfig {
            reset_threshold: 3,
            ..Default::default()
        };
        let mut sorter = Sorter::new(Some(by_value()), config);
        sorter.sort(data(&[(1, 5)])).unwrap();

        let sorted = sorter
            .sort(data(&[(2, 4), (3, 3), (4, 2)]))
            .unwrap()
            .unwrap();
        assert_eq!(sorted.sort_reason(), SortReason::Reset);
        assert!(sorted.changes.iter().all(|c| c.current_index.is_none()));
        assert_eq!(sorted_keys(&sorted), fresh_sort(&sorter));
    }

    #[test]
    fn test_small_batch_is_incremental() {
        let config = SortConfig {
            reset_threshold: 3,
            ..Default::default()
        };
        let mut sorter = Sorter::new(Some(by_value()), config);
        sorter.sort(data(&[(1, 5)])).unwrap();

        let sorted = sorter.sort(data(&[(2, 4), (3, 3)])).unwrap().unwrap();
        assert_eq!(sorted.sort_reason(), SortReason::DataChanged);
        assert_eq!(sorted.changes.as_slice()[0].current_index, Some(0));
        assert_eq!(sorted.changes.as_slice()[1].current_index, Some(0));
    }

    #[test]
    fn test_comparer_change_reorders_or_resets() {
        let mut sorter = Sorter::new(Some(by_value()), SortConfig::default());
        sorter.sort(data(&[(1, 1), (2, 2), (3, 3)])).unwrap();

        let descending = KeyValueComparer::descending_by(|v: &i64| *v);
        let sorted = sorter.sort(SortInput::Comparer(descending.clone())).unwrap().unwrap();
        assert_eq!(sorted.sort_reason(), SortReason::Reorder);
        assert!(sorted.changes.iter().all(|c| c.reason == ChangeReason::Moved));
        assert_eq!(sorted_keys(&sorted), vec![3, 2, 1]);

        let config = SortConfig {
            reset_threshold: 2,
            ..Default::default()
        };
        let mut large = Sorter::new(Some(by_value()), config);
        large.sort(data(&[(1, 1)])).unwrap();
        large.sort(data(&[(2, 2)])).unwrap();
        let sorted = large.sort(SortInput::Comparer(descending)).unwrap().unwrap();
        assert_eq!(sorted.sort_reason(), SortReason::Reset);
        assert!(sorted.changes.is_empty());
        assert_eq!(sorted_keys(&sorted), vec![2, 1]);
    }

    #[test]
    fn test_empty_passes_are_suppressed() {
        let mut sorter = Sorter::new(Some(by_value()), SortConfig::default());
        sorter.sort(data(&[(1, 1), (2, 2)])).unwrap();

        assert!(sorter.sort(SortInput::Resort).unwrap().is_none());
        assert!(sorter.sort(SortInput::Data(ChangeSet::new())).unwrap().is_none());
        // Removing an absent key normalizes to nothing.
        let noop: ChangeSet<u32, i64> = vec![Change::remove(9, 0)].into();
        assert!(sorter.sort(SortInput::Data(noop)).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_reflects_last_pass() {
        let mut sorter = Sorter::new(Some(by_value()), SortConfig::default());
        assert!(sorter.snapshot().is_none());

        sorter.sort(data(&[(1, 9), (2, 3)])).unwrap();
        sorter.sort(data(&[(3, 5)])).unwrap();

        let snapshot = sorter.snapshot().unwrap();
        assert_eq!(sorted_keys(&snapshot), vec![2, 3, 1]);
        assert_eq!(snapshot.changes.adds(), 3);
        assert_eq!(snapshot.sort_reason(), SortReason::InitialLoad);
    }
}
