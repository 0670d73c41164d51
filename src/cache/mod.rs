//! Keyed stores.
//!
//! [`ChangeAwareCache`] is the plain single-threaded store that records its
//! own mutations. [`SourceCache`] wraps one behind a lock and publishes each
//! batch to subscribers.

mod source;
mod store;

pub use source::{CacheUpdater, KeySelector, SourceCache};
pub use store::ChangeAwareCache;
