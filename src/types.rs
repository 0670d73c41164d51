//! Core types shared across the cache.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bound for cache keys.
///
/// Keys need equality and hashing for the keyed store, and a total order so
/// sorted projections can break ties between entries whose values compare
/// equal.
pub trait CacheKey: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

/// Bound for cache values.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    /// This timestamp shifted forward by `duration`, saturating.
    pub fn plus(self, duration: Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }

    /// Time remaining from `self` until `later`, zero if already passed.
    pub fn until(self, later: Timestamp) -> Duration {
        if later.0 <= self.0 {
            Duration::ZERO
        } else {
            Duration::from_micros((later.0 - self.0) as u64)
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Why a sort pass ran. Selects the algorithmic path of the sorter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortReason {
    /// First pass over whatever the source already holds.
    InitialLoad,
    /// Incremental data changes.
    DataChanged,
    /// The comparer was swapped.
    ComparerChanged,
    /// Explicit re-sort of the held list.
    Reorder,
    /// Wholesale rebuild, used for large batches.
    Reset,
}

/// Flags that let the sorter skip work it can prove redundant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptimisations {
    /// Values never mutate in place, so the old position of an updated or
    /// removed entry can be found by binary search on its previous value.
    #[serde(default)]
    pub compares_immutable_values_only: bool,

    /// Refresh changes never produce moves; the list is re-sorted silently.
    #[serde(default)]
    pub ignore_evaluates: bool,
}

impl SortOptimisations {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn immutable_values() -> Self {
        Self {
            compares_immutable_values_only: true,
            ..Default::default()
        }
    }
}

/// An entry tracked by an eviction policy.
///
/// `timestamp` is when the size limiter last saw the entry written, or when
/// the expiry tracker will remove it. `index` is the acquisition order, used
/// to break ties between entries stamped with the same time.
#[derive(Clone, Debug)]
pub struct ExpirableItem<K, V> {
    pub key: K,
    pub value: V,
    pub timestamp: Timestamp,
    pub index: u64,
}
