//! Time-based expiry.

use crate::changes::{ChangeReason, ChangeSet};
use crate::types::{CacheKey, CacheValue, ExpirableItem, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Maps a value to its time-to-live. `None` means the value never expires.
pub type ExpirySelector<V> = Arc<dyn Fn(&V) -> Option<Duration> + Send + Sync>;

/// Tracks per-entry expiry deadlines.
pub struct ExpiryTracker<K, V> {
    selector: ExpirySelector<V>,
    tracked: HashMap<K, ExpirableItem<K, V>>,
    next_index: u64,
}

impl<K: CacheKey, V: CacheValue> ExpiryTracker<K, V> {
    pub fn new<F>(selector: F) -> Self
    where
        F: Fn(&V) -> Option<Duration> + Send + Sync + 'static,
    {
        Self {
            selector: Arc::new(selector),
            tracked: HashMap::new(),
            next_index: 0,
        }
    }

    /// Number of entries with a pending deadline.
    pub fn tracked(&self) -> usize {
        self.tracked.len()
    }

    /// Stamp Adds and Updates with their deadline and untrack Removes.
    ///
    /// An Update whose new value never expires cancels the old deadline.
    pub fn change(&mut self, changes: &ChangeSet<K, V>, now: Timestamp) {
        for change in changes {
            match change.reason {
                ChangeReason::Add | ChangeReason::Update => match (self.selector)(&change.current) {
                    Some(ttl) => {
                        let index = self.next_index;
                        self.next_index += 1;
                        self.tracked.insert(
                            change.key.clone(),
                            ExpirableItem {
                                key: change.key.clone(),
                                value: change.current.clone(),
                                timestamp: now.plus(ttl),
                                index,
                            },
                        );
                    }
                    None => {
                        self.tracked.remove(&change.key);
                    }
                },
                ChangeReason::Remove => {
                    self.tracked.remove(&change.key);
                }
                ChangeReason::Refresh | ChangeReason::Moved => {}
            }
        }
    }

    /// Drain every entry whose deadline is at or before `now`, earliest first.
    pub fn expired(&mut self, now: Timestamp) -> Vec<ExpirableItem<K, V>> {
        let mut due: Vec<(Timestamp, u64, K)> = self
            .tracked
            .values()
            .filter(|item| item.timestamp <= now)
            .map(|item| (item.timestamp, item.index, item.key.clone()))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, _, key)| self.tracked.remove(&key))
            .collect()
    }

    /// The earliest pending deadline.
    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.tracked.values().map(|item| item.timestamp).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::Change;

    fn tracker() -> ExpiryTracker<&'static str, u64> {
        // Values are TTLs in microseconds; 0 never expires.
        ExpiryTracker::new(|ttl: &u64| (*ttl > 0).then(|| Duration::from_micros(*ttl)))
    }

    #[test]
    fn test_expired_drains_due_entries_in_order() {
        let mut tracker = tracker();
        tracker.change(
            &vec![
                Change::add("slow", 300),
                Change::add("fast", 100),
                Change::add("never", 0),
            ]
            .into(),
            Timestamp(1_000),
        );

        assert_eq!(tracker.tracked(), 2);
        assert_eq!(tracker.next_expiry(), Some(Timestamp(1_100)));
        assert!(tracker.expired(Timestamp(1_050)).is_empty());

        let due: Vec<_> = tracker
            .expired(Timestamp(1_300))
            .into_iter()
            .map(|item| item.key)
            .collect();
        assert_eq!(due, vec!["fast", "slow"]);
        assert_eq!(tracker.next_expiry(), None);
    }

    #[test]
    fn test_update_moves_deadline() {
        let mut tracker = tracker();
        tracker.change(&vec![Change::add("a", 100)].into(), Timestamp(0));
        tracker.change(&vec![Change::update("a", 500, 100)].into(), Timestamp(50));
        assert_eq!(tracker.next_expiry(), Some(Timestamp(550)));

        tracker.change(&vec![Change::update("a", 0, 500)].into(), Timestamp(60));
        assert_eq!(tracker.next_expiry(), None);
    }

    #[test]
    fn test_remove_cancels_deadline() {
        let mut tracker = tracker();
        tracker.change(&vec![Change::add("a", 100)].into(), Timestamp(0));
        tracker.change(&vec![Change::remove("a", 100)].into(), Timestamp(10));
        assert!(tracker.expired(Timestamp(1_000)).is_empty());
    }
}
