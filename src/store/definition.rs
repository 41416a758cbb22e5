use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHasher;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::action::ActionApi;
use crate::error::Result;

/// Separator between key segments in a composite registry key.
pub const KEY_SEPARATOR: &str = "__";

/// Values a store can hold.
pub trait StoreValue: PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreValue for T where T: PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Container props handed to every action thunk.
pub trait Props: Clone + Default + Send + Sync + 'static {}

impl<T> Props for T where T: Clone + Default + Send + Sync + 'static {}

pub type ActionResult = Result<Value>;

/// The second stage of an action: receives the store API and current props.
pub type Thunk<S, P = ()> = Box<dyn FnOnce(&ActionApi<S, P>, &P) -> ActionResult + Send>;

/// The first stage of an action: turns call arguments into a [`Thunk`].
pub type ActionCreator<S, P = ()> = Arc<dyn Fn(Value) -> Thunk<S, P> + Send + Sync>;

/// Typed base mutator. Receives the current state and the patch, may report
/// an output through the callback, and returns the next state.
pub type Mutator<S> = Arc<dyn Fn(&S, Value, &mut dyn FnMut(Value)) -> Result<S> + Send + Sync>;

static NEXT_DEFINITION: AtomicU64 = AtomicU64::new(1);
static NEXT_KIND: AtomicU64 = AtomicU64::new(1);

/// Identity of a definition; two definitions are the same store only if
/// their ids are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

/// A named class of containers that stores can require as their scope.
#[derive(Clone, Debug)]
pub struct ContainerKind {
    id: u64,
    name: Arc<str>,
}

impl ContainerKind {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_KIND.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ContainerKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ContainerKind {}

impl Hash for ContainerKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Type-independent facts about a definition, used by scope matching.
#[derive(Clone, Debug)]
pub struct DefinitionMeta {
    pub id: DefinitionId,
    pub name: Option<String>,
    pub tags: BTreeSet<String>,
    pub contained_by: Option<ContainerKind>,
}

impl DefinitionMeta {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("store#{}", self.id.0),
        }
    }
}

/// Immutable description of a store: initial state, actions and identity.
pub struct StoreDefinition<S, P = ()> {
    meta: DefinitionMeta,
    initial_state: Arc<S>,
    actions: BTreeMap<String, ActionCreator<S, P>>,
    mutator: Option<Mutator<S>>,
    key: OnceLock<Vec<String>>,
}

impl<S, P> StoreDefinition<S, P> {
    pub fn meta(&self) -> &DefinitionMeta {
        &self.meta
    }

    pub fn id(&self) -> DefinitionId {
        self.meta.id
    }

    pub fn initial_state(&self) -> &Arc<S> {
        &self.initial_state
    }

    pub fn action(&self, name: &str) -> Option<&ActionCreator<S, P>> {
        self.actions.get(name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn mutator(&self) -> Option<&Mutator<S>> {
        self.mutator.as_ref()
    }
}

impl<S: StoreValue, P: Props> StoreDefinition<S, P> {
    pub fn builder(initial_state: S) -> DefinitionBuilder<S, P> {
        DefinitionBuilder {
            name: None,
            tags: BTreeSet::new(),
            contained_by: None,
            initial_state,
            actions: BTreeMap::new(),
            mutator: None,
        }
    }

    /// `[name]` for named stores, otherwise a hash of the serialized initial
    /// state and the action names. Computed on first use. A state that fails
    /// to serialize is keyed by the definition id instead.
    pub fn key(&self) -> &[String] {
        self.key.get_or_init(|| match &self.meta.name {
            Some(name) => vec![name.clone()],
            None => vec![self.content_hash()],
        })
    }

    pub fn joined_key(&self) -> String {
        self.key().join(KEY_SEPARATOR)
    }

    fn content_hash(&self) -> String {
        let mut hasher = FxHasher::default();
        match serde_json::to_string(&*self.initial_state) {
            Ok(serialized) => serialized.hash(&mut hasher),
            Err(err) => {
                tracing::warn!(store = %self.meta.label(), %err, "initial state not serializable, keyed by definition id");
                self.meta.id.hash(&mut hasher);
            }
        }
        for name in self.actions.keys() {
            name.hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }
}

impl<S, P> std::fmt::Debug for StoreDefinition<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("meta", &self.meta)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

pub struct DefinitionBuilder<S, P = ()> {
    name: Option<String>,
    tags: BTreeSet<String>,
    contained_by: Option<ContainerKind>,
    initial_state: S,
    actions: BTreeMap<String, ActionCreator<S, P>>,
    mutator: Option<Mutator<S>>,
}

impl<S: StoreValue, P: Props> DefinitionBuilder<S, P> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn contained_by(mut self, kind: &ContainerKind) -> Self {
        self.contained_by = Some(kind.clone());
        self
    }

    /// Register an action creator. Registering a name twice keeps the last one.
    pub fn action<F, T>(mut self, name: impl Into<String>, creator: F) -> Self
    where
        F: Fn(Value) -> T + Send + Sync + 'static,
        T: FnOnce(&ActionApi<S, P>, &P) -> ActionResult + Send + 'static,
    {
        let creator: ActionCreator<S, P> =
            Arc::new(move |args: Value| -> Thunk<S, P> { Box::new(creator(args)) });
        self.actions.insert(name.into(), creator);
        self
    }

    /// Replace the runtime's merge policy with a typed mutator for this store.
    pub fn mutator<F>(mut self, mutator: F) -> Self
    where
        F: Fn(&S, Value, &mut dyn FnMut(Value)) -> Result<S> + Send + Sync + 'static,
    {
        self.mutator = Some(Arc::new(mutator));
        self
    }

    pub fn build(self) -> Arc<StoreDefinition<S, P>> {
        Arc::new(StoreDefinition {
            meta: DefinitionMeta {
                id: DefinitionId(NEXT_DEFINITION.fetch_add(1, Ordering::Relaxed)),
                name: self.name,
                tags: self.tags,
                contained_by: self.contained_by,
            },
            initial_state: Arc::new(self.initial_state),
            actions: self.actions,
            mutator: self.mutator,
            key: OnceLock::new(),
        })
    }
}
