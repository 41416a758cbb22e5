//! Derived views of store state.
//!
//! A [`Selector`] turns `(state, args)` into an `Arc` of its output. The
//! memoizing selectors hand back the previous `Arc` whenever the new output
//! is equal to it, so consumers can detect "nothing changed" with
//! `Arc::ptr_eq` alone.

mod compose;
mod memo;

use std::sync::Arc;

pub use compose::{create_selector, Combine, ComposedSelector, SelectorInputs};
pub use memo::{create_memoized_selector, MemoSelector};

pub trait Selector<S, A = ()>: Send + Sync {
    type Output: PartialEq + Send + Sync + 'static;

    fn select(&self, state: &Arc<S>, args: &A) -> Arc<Self::Output>;

    /// Whether the output depends on state at all. Consumers skip
    /// subscribing to the store when this is false.
    fn reads_state(&self) -> bool {
        true
    }

    /// The output for selectors that never look at state. Consumers use it
    /// instead of calling [`select`](Self::select).
    fn without_state(&self, _args: &A) -> Option<Arc<Self::Output>> {
        None
    }
}

impl<S, A, T> Selector<S, A> for Arc<T>
where
    T: Selector<S, A> + ?Sized,
{
    type Output = T::Output;

    fn select(&self, state: &Arc<S>, args: &A) -> Arc<Self::Output> {
        (**self).select(state, args)
    }

    fn reads_state(&self) -> bool {
        (**self).reads_state()
    }

    fn without_state(&self, args: &A) -> Option<Arc<Self::Output>> {
        (**self).without_state(args)
    }
}

/// Selects the whole state.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl<S, A> Selector<S, A> for Identity
where
    S: PartialEq + Send + Sync + 'static,
{
    type Output = S;

    fn select(&self, state: &Arc<S>, _args: &A) -> Arc<S> {
        Arc::clone(state)
    }
}

/// Selects nothing, for consumers that only want the actions.
#[derive(Clone, Debug, Default)]
pub struct NoState {
    unit: Arc<()>,
}

impl<S, A> Selector<S, A> for NoState {
    type Output = ();

    fn select(&self, _state: &Arc<S>, _args: &A) -> Arc<()> {
        Arc::clone(&self.unit)
    }

    fn reads_state(&self) -> bool {
        false
    }

    fn without_state(&self, _args: &A) -> Option<Arc<()>> {
        Some(Arc::clone(&self.unit))
    }
}
