//! # livecache
//!
//! An in-memory keyed cache that publishes every batch of mutations as a
//! change-set, plus derived live views built from those change-sets.
//!
//! ## Core Concepts
//!
//! - **Change-sets**: Ordered batches of Add, Update, Remove, Refresh and Moved
//! - **Source cache**: A keyed store whose edits are broadcast to subscribers
//! - **Sorting**: Positional change-sets against a maintained sorted list
//! - **Filtering**: Sorted views restricted to items matching a predicate
//! - **Grouping**: Partitions keyed by a derived group key
//! - **Eviction**: Size limits and time-based expiry applied to a live source
//!
//! ## Example
//!
//! ```ignore
//! use livecache::{KeyValueComparer, SourceCache, SubscriptionConfig};
//!
//! let people = SourceCache::new(|p: &Person| p.name.clone());
//! let sorted = people.sort(KeyValueComparer::ascending_by(|p: &Person| p.age))?;
//! let handle = sorted.connect(SubscriptionConfig::default());
//!
//! people.edit(|updater| {
//!     updater.add_or_update(Person::new("A", 30));
//!     updater.add_or_update(Person::new("B", 20));
//! })?;
//!
//! let _limit = people.limit_size(1_000)?;
//! ```

pub mod cache;
pub mod changes;
pub mod config;
pub mod error;
pub mod eviction;
pub mod groups;
pub mod sorting;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use cache::{CacheUpdater, ChangeAwareCache, KeySelector, SourceCache};
pub use changes::{Change, ChangeReason, ChangeSet};
pub use config::{CacheConfig, SortConfig, DEFAULT_RESET_THRESHOLD};
pub use error::{CacheError, Result};
pub use eviction::{EvictionHandle, EvictionPolicy, ExpirySelector, ExpiryTracker, SizeLimiter};
pub use groups::{Group, GroupChangeSet, GroupManager, GroupSelector};
pub use sorting::{
    FilterResult, FilteredIndexCalculator, FilteredSorter, KeyValueCollection, KeyValueComparer,
    Predicate, SearchResult, SortInput, SortedChangeSet, SortedIndexCalculator, SortedStream,
    Sorter, ValueComparer,
};
pub use subscriptions::{
    CacheEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;
