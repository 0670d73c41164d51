//! Change vocabulary spoken by every stage of the cache.

mod change;
mod change_set;

pub use change::{Change, ChangeReason};
pub use change_set::ChangeSet;
