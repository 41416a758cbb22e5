use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::definition::{Props, StoreDefinition, StoreValue};
use super::state::{StoreState, StoreView};
use crate::action::BoundActions;
use crate::error::{Result, StoreError};
use crate::runtime::RuntimeInner;
use crate::scope::Scope;

/// Default scope id of the runtime's shared registry.
pub const GLOBAL_SCOPE: &str = "__global__";

/// Default scope id of registries owned by a single boundary.
pub const LOCAL_SCOPE: &str = "__local__";

/// A store's live state together with its bound actions.
pub struct StoreHandle<S, P = ()> {
    pub state: StoreState<S>,
    pub actions: BoundActions<S, P>,
}

impl<S, P> Clone for StoreHandle<S, P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<S, P> std::fmt::Debug for StoreHandle<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("state", &self.state)
            .field("actions", &self.actions)
            .finish()
    }
}

impl<S: StoreValue, P: Props> StoreHandle<S, P> {
    /// Same state, actions resolving `dispatch_to` through `scope`.
    pub fn with_scope(self, scope: Scope) -> Self {
        Self {
            state: self.state,
            actions: self.actions.with_scope(scope),
        }
    }
}

struct Entry {
    view: Arc<dyn StoreView>,
    typed: Arc<dyn Any + Send + Sync>,
}

pub(crate) struct RegistryInner {
    stores: RwLock<FxHashMap<String, Entry>>,
    initial_states: RwLock<FxHashMap<String, Value>>,
    default_scope: &'static str,
    runtime: Arc<RuntimeInner>,
}

/// Keyed collection of store states for one ownership context.
///
/// Keys are `definition.key joined by "__" + "@" + scope id`. Two registries
/// never share entries, even for identical keys.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub(crate) fn shared(runtime: Arc<RuntimeInner>) -> Self {
        Self::with_default_scope(runtime, GLOBAL_SCOPE)
    }

    pub(crate) fn local(runtime: Arc<RuntimeInner>) -> Self {
        Self::with_default_scope(runtime, LOCAL_SCOPE)
    }

    fn with_default_scope(runtime: Arc<RuntimeInner>, default_scope: &'static str) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                stores: RwLock::new(FxHashMap::default()),
                initial_states: RwLock::new(FxHashMap::default()),
                default_scope,
                runtime,
            }),
        }
    }

    pub fn default_scope(&self) -> &str {
        self.inner.default_scope
    }

    /// Replace the table of injected initial states. Only stores created
    /// afterwards observe it.
    pub fn configure(&self, initial_states: HashMap<String, Value>) {
        *self.inner.initial_states.write() = initial_states.into_iter().collect();
    }

    pub fn generate_key<S: StoreValue, P: Props>(
        &self,
        definition: &StoreDefinition<S, P>,
        scope_id: Option<&str>,
    ) -> String {
        format!(
            "{}@{}",
            definition.joined_key(),
            scope_id.unwrap_or(self.inner.default_scope)
        )
    }

    /// Existing store for `(definition, scope_id)`, or a newly created one.
    pub fn get_store<S: StoreValue, P: Props>(
        &self,
        definition: &Arc<StoreDefinition<S, P>>,
        scope_id: Option<&str>,
    ) -> Result<StoreHandle<S, P>> {
        let key = self.generate_key(definition, scope_id);
        if let Some(entry) = self.inner.stores.read().get(&key) {
            return downcast(&key, entry);
        }

        let initial = match self.inner.initial_states.read().get(&key) {
            Some(injected) => Arc::new(serde_json::from_value::<S>(injected.clone())?),
            None => Arc::clone(definition.initial_state()),
        };

        let mut stores = self.inner.stores.write();
        if let Some(entry) = stores.get(&key) {
            return downcast(&key, entry);
        }
        let state = StoreState::new(
            Arc::clone(&self.inner.runtime),
            key.clone(),
            initial,
            definition.mutator().cloned(),
        );
        let actions = BoundActions::new(
            Arc::clone(definition),
            state.clone(),
            Arc::new(P::default),
            Scope::detached(self.downgrade()),
        );
        let handle = StoreHandle { state, actions };
        stores.insert(
            key.clone(),
            Entry {
                view: Arc::new(handle.state.clone()),
                typed: Arc::new(handle.clone()),
            },
        );
        drop(stores);
        tracing::debug!(%key, "store created");
        handle.state.connect_devtools();
        Ok(handle)
    }

    /// Remove the entry for `(definition, scope_id)`, listeners or not.
    pub fn delete_store<S: StoreValue, P: Props>(
        &self,
        definition: &StoreDefinition<S, P>,
        scope_id: Option<&str>,
    ) -> bool {
        let key = self.generate_key(definition, scope_id);
        self.delete_key(&key)
    }

    pub fn delete_key(&self, key: &str) -> bool {
        let removed = self.inner.stores.write().remove(key).is_some();
        if removed {
            tracing::debug!(%key, "store deleted");
        }
        removed
    }

    pub fn has_store<S: StoreValue, P: Props>(
        &self,
        definition: &StoreDefinition<S, P>,
        scope_id: Option<&str>,
    ) -> bool {
        let key = self.generate_key(definition, scope_id);
        self.inner.stores.read().contains_key(&key)
    }

    /// Type-erased view of a stored entry.
    pub fn view(&self, key: &str) -> Option<Arc<dyn StoreView>> {
        self.inner
            .stores
            .read()
            .get(key)
            .map(|entry| Arc::clone(&entry.view))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.stores.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.stores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every entry nobody listens to. Returns the removed keys.
    pub fn delete_unobserved(&self) -> Vec<String> {
        let mut removed = Vec::new();
        self.inner.stores.write().retain(|key, entry| {
            let keep = entry.view.listener_count() > 0;
            if !keep {
                removed.push(key.clone());
            }
            keep
        });
        removed.sort();
        for key in &removed {
            tracing::debug!(%key, "unobserved store deleted");
        }
        removed
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("default_scope", &self.inner.default_scope)
            .field("stores", &self.keys())
            .finish()
    }
}

/// Non-owning registry handle held by scopes and bound actions.
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Result<Registry> {
        self.0
            .upgrade()
            .map(|inner| Registry { inner })
            .ok_or(StoreError::RegistryDropped)
    }
}

fn downcast<S: StoreValue, P: Props>(key: &str, entry: &Entry) -> Result<StoreHandle<S, P>> {
    entry
        .typed
        .downcast_ref::<StoreHandle<S, P>>()
        .cloned()
        .ok_or_else(|| StoreError::TypeMismatch { key: key.to_string() })
}
