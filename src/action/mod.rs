//! Binding action creators to a live store.
//!
//! An action is two-staged: the creator receives the call arguments and
//! returns a thunk, the thunk receives an [`ActionApi`] and the container
//! props. Every `set_state` issued through the API is tagged with the
//! action's label so middlewares and devtools can attribute it.

mod binder;

pub use binder::{bind_action, ActionApi, BoundAction, BoundActions, PropsProvider};
