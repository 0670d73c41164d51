//! Grouping of a keyed stream by a derived group key.
//!
//! Each group is itself a change-aware store, so consumers receive
//! per-group member change-sets alongside the group-level Adds and Removes.

mod group;
mod manager;

pub use group::Group;
pub use manager::{GroupChangeSet, GroupManager, GroupSelector};
