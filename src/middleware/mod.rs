//! Interceptors around a store's mutator.
//!
//! The chain for a store is `defaults middlewares → devtools (optional) →
//! update stage → base mutator`. The first middleware in the list is the
//! outermost one. Each middleware receives the patch and a `next`
//! continuation; not calling `next` drops the mutation.

pub mod devtools;

use serde_json::Value;

use crate::error::Result;
use crate::store::StoreView;

/// Whatever the base mutator reported through its capture callback.
pub type Outcome = Option<Value>;

/// Continuation into the rest of the chain.
pub type Next<'a> = &'a dyn Fn(Value) -> Result<Outcome>;

pub trait Middleware: Send + Sync {
    fn handle(&self, store: &dyn StoreView, arg: Value, next: Next<'_>) -> Result<Outcome>;
}

/// Middleware backed by a closure. Build with [`from_fn`].
pub struct FnMiddleware<F>(F);

/// Wrap a closure as a [`Middleware`].
///
/// ```
/// use canopy::middleware::from_fn;
///
/// let guard = from_fn(|store, arg, next| {
///     if store.action_name() == "locked" {
///         return Ok(None);
///     }
///     next(arg)
/// });
/// # let _ = guard;
/// ```
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a dyn StoreView, Value, Next<'a>) -> Result<Outcome> + Send + Sync,
{
    FnMiddleware(f)
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a dyn StoreView, Value, Next<'a>) -> Result<Outcome> + Send + Sync,
{
    fn handle(&self, store: &dyn StoreView, arg: Value, next: Next<'_>) -> Result<Outcome> {
        (self.0)(store, arg, next)
    }
}

/// Run `arg` through `middlewares`, ending in `terminal`.
pub(crate) fn run_chain(
    store: &dyn StoreView,
    middlewares: &[std::sync::Arc<dyn Middleware>],
    arg: Value,
    terminal: &dyn Fn(Value) -> Result<Outcome>,
) -> Result<Outcome> {
    match middlewares.split_first() {
        Some((head, rest)) => head.handle(store, arg, &|arg| run_chain(store, rest, arg, terminal)),
        None => terminal(arg),
    }
}
