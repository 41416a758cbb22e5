//! # Canopy
//!
//! Scoped reactive state containers for component trees.
//!
//! Canopy keeps application state in stores that are created on demand,
//! scoped to parts of a consumer tree and mutated only through actions.
//!
//! ## Stores
//!
//! - [`StoreDefinition`] - immutable description: initial state, actions, key
//! - [`Registry`] - owns one live [`StoreState`] per definition and scope id
//! - [`Scope`] / [`Container`] - decide which instance a lookup resolves to
//!
//! ## Mutation pipeline
//!
//! Every partial update runs through the runtime's [`Middleware`] chain and
//! an update stage that commits only when the state actually changed.
//! Listener notification is deferred to the [`Scheduler`], so several
//! updates in one tick produce one notification per store.
//!
//! ## Selectors
//!
//! - [`create_memoized_selector`] - single-entry memo keyed by state and args
//! - [`create_selector`] - composition of input selectors
//! - [`StoreSubscriber`] - consumer binding that only fires on real changes
//!
//! ```
//! use canopy::prelude::*;
//! use serde::{Deserialize, Serialize};
//! use serde_json::{json, Value};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! let counter = StoreDefinition::builder(Counter { count: 0 })
//!     .named("counter")
//!     .action("increment", |_args: Value| {
//!         |api: &ActionApi<Counter>, _: &()| -> ActionResult {
//!             api.set_state(json!({"count": api.get_state().count + 1}))?;
//!             Ok(Value::Null)
//!         }
//!     })
//!     .build();
//!
//! let runtime = Runtime::new();
//! let store = runtime.root_scope().resolve(&counter, None)?;
//! store.actions.call("increment", Value::Null)?;
//! assert_eq!(store.state.get_state().count, 1);
//! # Ok::<(), canopy::StoreError>(())
//! ```

pub mod action;
pub mod consumer;
pub mod error;
pub mod middleware;
pub mod runtime;
pub mod scheduler;
pub mod scope;
pub mod selector;
pub mod store;

pub use action::{ActionApi, BoundAction, BoundActions};
pub use consumer::StoreSubscriber;
pub use error::{DevtoolsError, Result, StoreError};
pub use middleware::{from_fn, Middleware};
pub use runtime::{Defaults, MergePolicy, Runtime, Settings};
pub use scheduler::{FlushMode, Scheduler};
pub use scope::{Container, DynamicContainer, Matcher, Scope};
pub use selector::{create_memoized_selector, create_selector, Identity, NoState, Selector};
pub use store::{
    ActionResult, ContainerKind, Registry, StoreDefinition, StoreHandle, StoreState, Subscription,
};

/// The types most programs need, for glob import.
pub mod prelude {
    pub use crate::action::ActionApi;
    pub use crate::runtime::Runtime;
    pub use crate::scope::{Container, Scope};
    pub use crate::selector::{create_memoized_selector, create_selector, Selector};
    pub use crate::store::{ActionResult, StoreDefinition};
}
