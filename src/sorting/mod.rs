//! Sorted projections of a keyed change-set stream.
//!
//! [`SortedIndexCalculator`] turns keyed change-sets into positional ones
//! against a maintained sorted list. [`Sorter`] decides per input whether to
//! diff, reorder or rebuild, and [`SortedStream`] runs a sorter on a worker
//! thread fed by a source subscription. [`FilteredSorter`] combines a
//! predicate with the same ordering machinery.

mod calculator;
mod collection;
mod comparer;
mod filtered;
mod sorter;
mod stream;

pub use calculator::SortedIndexCalculator;
pub use collection::KeyValueCollection;
pub use comparer::{KeyValueComparer, SearchResult, ValueComparer};
pub use filtered::{FilterResult, FilteredIndexCalculator, FilteredSorter, Predicate};
pub use sorter::{SortInput, SortedChangeSet, Sorter};
pub use stream::SortedStream;
