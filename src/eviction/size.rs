//! Size-bounded eviction.

use crate::changes::{ChangeReason, ChangeSet};
use crate::error::{CacheError, Result};
use crate::types::{CacheKey, CacheValue, ExpirableItem, Timestamp};
use lru::LruCache;

/// Keeps a store at or below a fixed number of entries by choosing the
/// least recently written entries for removal.
///
/// Entries are stamped on Add and on Update, so a recently updated entry
/// counts as recent. Within one change-set, earlier changes are older.
pub struct SizeLimiter<K, V> {
    limit: usize,
    /// Tracked entries, least recently written first.
    tracked: LruCache<K, ExpirableItem<K, V>>,
    next_index: u64,
}

impl<K: CacheKey, V: CacheValue> SizeLimiter<K, V> {
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(CacheError::InvalidArgument(
                "size limit must be greater than zero".into(),
            ));
        }
        Ok(Self {
            limit,
            tracked: LruCache::unbounded(),
            next_index: 0,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of entries currently tracked.
    pub fn tracked(&self) -> usize {
        self.tracked.len()
    }

    /// Track a change-set and return the entries to evict, oldest first.
    ///
    /// Returned entries are no longer tracked.
    pub fn change(&mut self, changes: &ChangeSet<K, V>, now: Timestamp) -> Vec<ExpirableItem<K, V>> {
        for change in changes {
            match change.reason {
                ChangeReason::Add | ChangeReason::Update => {
                    let index = self.next_index;
                    self.next_index += 1;
                    self.tracked.put(
                        change.key.clone(),
                        ExpirableItem {
                            key: change.key.clone(),
                            value: change.current.clone(),
                            timestamp: now,
                            index,
                        },
                    );
                }
                ChangeReason::Remove => {
                    self.tracked.pop(&change.key);
                }
                ChangeReason::Refresh | ChangeReason::Moved => {}
            }
        }

        let mut evicted = Vec::new();
        while self.tracked.len() > self.limit {
            match self.tracked.pop_lru() {
                Some((_, item)) => evicted.push(item),
                None => break,
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::Change;

    fn adds(keys: &[&'static str]) -> ChangeSet<&'static str, u32> {
        keys.iter().map(|k| Change::add(*k, 0)).collect()
    }

    fn keys(items: Vec<ExpirableItem<&'static str, u32>>) -> Vec<&'static str> {
        items.into_iter().map(|i| i.key).collect()
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        assert!(matches!(
            SizeLimiter::<u32, u32>::new(0),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_evicts_oldest_beyond_limit() {
        let mut limiter = SizeLimiter::new(2).unwrap();
        assert!(limiter.change(&adds(&["x"]), Timestamp(1)).is_empty());
        assert!(limiter.change(&adds(&["y"]), Timestamp(2)).is_empty());

        let evicted = limiter.change(&adds(&["z"]), Timestamp(3));
        assert_eq!(keys(evicted), vec!["x"]);
        assert_eq!(limiter.tracked(), 2);
    }

    #[test]
    fn test_evicted_items_carry_acquisition_time() {
        let mut limiter = SizeLimiter::new(1).unwrap();
        limiter.change(&adds(&["x"]), Timestamp(10));

        let evicted = limiter.change(&adds(&["y"]), Timestamp(20));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "x");
        assert_eq!(evicted[0].timestamp, Timestamp(10));
    }

    #[test]
    fn test_same_instant_ties_break_by_acquisition() {
        let mut limiter = SizeLimiter::new(1).unwrap();
        let evicted = limiter.change(&adds(&["a", "b", "c"]), Timestamp(5));
        assert_eq!(keys(evicted), vec!["a", "b"]);
    }

    #[test]
    fn test_update_restamps_entry() {
        let mut limiter = SizeLimiter::new(2).unwrap();
        limiter.change(&adds(&["x", "y"]), Timestamp(1));
        limiter.change(&vec![Change::update("x", 1, 0)].into(), Timestamp(2));

        let evicted = limiter.change(&adds(&["z"]), Timestamp(3));
        assert_eq!(keys(evicted), vec!["y"]);
    }

    #[test]
    fn test_removes_untrack() {
        let mut limiter = SizeLimiter::new(2).unwrap();
        limiter.change(&adds(&["x", "y"]), Timestamp(1));
        limiter.change(&vec![Change::remove("x", 0)].into(), Timestamp(2));

        assert!(limiter.change(&adds(&["z"]), Timestamp(3)).is_empty());
        assert_eq!(limiter.tracked(), 2);
    }
}
