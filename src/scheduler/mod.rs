//! Notification scheduling.
//!
//! Commits enqueue one notify task per store; the queue is deduplicated so
//! that many commits to the same store within one tick produce a single
//! notification pass carrying the final state.

mod queue;

pub use queue::{FlushMode, Scheduler, Task};
