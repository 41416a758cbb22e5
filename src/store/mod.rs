//! Store definitions, their live states and the registries that own them.
//!
//! A [`StoreDefinition`] is an immutable description. A [`Registry`] turns
//! it into a [`StoreState`] per composite key and keeps it alive until the
//! entry is deleted.

mod definition;
mod registry;
mod state;

pub use definition::{
    ActionCreator, ActionResult, ContainerKind, DefinitionBuilder, DefinitionId, DefinitionMeta,
    Mutator, Props, StoreDefinition, StoreValue, Thunk, KEY_SEPARATOR,
};
pub(crate) use registry::WeakRegistry;
pub use registry::{Registry, StoreHandle, GLOBAL_SCOPE, LOCAL_SCOPE};
pub use state::{Listener, StoreState, StoreView, Subscription};
