//! Eviction policies and the worker that applies them.
//!
//! Policies are plain state machines fed with change-sets and a clock
//! reading. [`EvictionHandle`] runs one against a live
//! [`SourceCache`](crate::SourceCache), removing the chosen keys through the
//! normal edit path.

mod driver;
mod size;
mod time;

pub(crate) use driver::EvictionTarget;
pub use driver::{EvictionHandle, EvictionPolicy};
pub use size::SizeLimiter;
pub use time::{ExpirySelector, ExpiryTracker};
