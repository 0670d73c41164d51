//! Subscription system for live change-set streams.
//!
//! Every stage of the cache publishes its change-sets through a
//! [`SubscriptionManager`]. Subscriptions support:
//! - An initial change-set describing existing contents, delivered first
//! - Bounded buffers with slow-subscriber dropping
//! - Per-subscription termination with an error
//!
//! # Example
//!
//! ```ignore
//! let cache = SourceCache::new(|person: &Person| person.name.clone());
//! let handle = cache.connect(SubscriptionConfig::default())?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(CacheEvent::Changes { changes }) => println!("{} changes", changes.len()),
//!         Ok(CacheEvent::Dropped { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{CacheEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId};
