//! Runtime support for stores.
//!
//! This module provides the explicitly constructed runtime object that owns
//! the shared registry, the notification scheduler and the global defaults.

mod context;
mod defaults;

pub(crate) use context::RuntimeInner;
pub use context::Runtime;
pub use defaults::{shallow_merge, Batcher, Defaults, MergeFn, MergeMode, MergePolicy, Settings};
