use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde_json::Value;

use super::definition::{Mutator, StoreValue};
use crate::error::Result;
use crate::middleware::devtools::{self, Devtools, DevtoolsMiddleware};
use crate::middleware::{run_chain, Middleware, Outcome};
use crate::runtime::RuntimeInner;

/// Callback invoked with the committed state on each notification pass.
pub type Listener<S> = Arc<dyn Fn(&Arc<S>) + Send + Sync>;

/// Type-erased view of a store, used by middlewares, devtools and registry
/// housekeeping.
pub trait StoreView: Send + Sync {
    /// Composite registry key of this store.
    fn key(&self) -> &str;

    /// Name of the action that issued the mutation in flight.
    fn action_name(&self) -> String;

    fn set_action_name(&self, name: &str);

    /// Current state as JSON.
    fn snapshot(&self) -> Result<Value>;

    fn listener_count(&self) -> usize;

    /// Run a patch through the store's full middleware pipeline.
    fn mutate(&self, arg: Value) -> Result<Outcome>;

    /// Run a complete recorded state through the pipeline. The terminal
    /// stage replaces the current state instead of merging into it.
    fn restore(&self, state: Value) -> Result<Outcome>;

    /// Number of commits so far. Unchanged by mutations that produced an
    /// equal state.
    fn revision(&self) -> u64;

    fn reset_state(&self);
}

pub(crate) struct StoreInner<S> {
    id: u64,
    key: String,
    state: RwLock<Arc<S>>,
    initial: Arc<S>,
    listeners: RwLock<Vec<(u64, Listener<S>)>>,
    next_listener: AtomicU64,
    action_name: Mutex<String>,
    // Held from reading the current state until the next one is stored.
    mutation: ReentrantMutex<()>,
    revision: AtomicU64,
    middlewares: Vec<Arc<dyn Middleware>>,
    devtools: Option<Arc<dyn Devtools>>,
    mutator: Option<Mutator<S>>,
    activated: AtomicBool,
    runtime: Arc<RuntimeInner>,
}

/// The live state of one store definition in one scope.
///
/// Cloning is cheap and yields a handle to the same state.
pub struct StoreState<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Clone for StoreState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: StoreValue> StoreState<S> {
    pub(crate) fn new(
        runtime: Arc<RuntimeInner>,
        key: String,
        initial: Arc<S>,
        mutator: Option<Mutator<S>>,
    ) -> Self {
        let (mut middlewares, devtools) = {
            let defaults = runtime.defaults.read();
            let devtools = defaults
                .devtools
                .then(|| defaults.devtools_connection.clone())
                .flatten();
            (defaults.middlewares.clone(), devtools)
        };
        if let Some(tool) = &devtools {
            middlewares.push(Arc::new(DevtoolsMiddleware::new(Arc::clone(tool))));
        }
        Self {
            inner: Arc::new(StoreInner {
                id: runtime.next_id(),
                key,
                state: RwLock::new(Arc::clone(&initial)),
                initial,
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                action_name: Mutex::new(String::new()),
                mutation: ReentrantMutex::new(()),
                revision: AtomicU64::new(0),
                middlewares,
                devtools,
                mutator,
                activated: AtomicBool::new(false),
                runtime,
            }),
        }
    }

    /// Send the initial baseline to the runtime's inspector, if one was
    /// enabled when the store was created. Must not run under a registry
    /// lock, since the inspector may read the registry.
    pub(crate) fn connect_devtools(&self) {
        if let Some(tool) = &self.inner.devtools {
            devtools::connect(self, tool.as_ref());
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The most recently committed state.
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&*self.inner.state.read())
    }

    /// Commit `next` and notify listeners, bypassing the middleware chain.
    pub fn set_state(&self, next: S) {
        self.commit(Arc::new(next));
    }

    /// Restore the state the store was created with.
    pub fn reset_state(&self) {
        self.commit(Arc::clone(&self.inner.initial));
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, Arc::new(listener)));
        let store: Weak<StoreInner<S>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = store.upgrade() {
                inner.listeners.write().retain(|(listener, _)| *listener != id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Call every listener, in subscription order, with the current state.
    ///
    /// The pass goes through the runtime's batcher when one is installed.
    pub fn notify(&self) {
        let listeners: Vec<Listener<S>> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let batcher = self.inner.runtime.defaults.read().batcher.clone();
        let mut pass = || {
            for listener in &listeners {
                listener(&self.get_state());
            }
        };
        match batcher {
            Some(batch) => batch(&mut pass),
            None => pass(),
        }
    }

    /// Head of the mutation pipeline.
    pub fn mutate(&self, arg: Value) -> Result<Outcome> {
        run_chain(self, &self.inner.middlewares, arg, &|arg| self.update(arg))
    }

    /// Like [`mutate`](Self::mutate), but the terminal stage deserializes
    /// `state` as a whole and replaces the current state with it.
    pub fn restore(&self, state: Value) -> Result<Outcome> {
        run_chain(self, &self.inner.middlewares, state, &|state| self.replace(state))
    }

    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    pub fn action_name(&self) -> String {
        self.inner.action_name.lock().clone()
    }

    /// Tag the next mutation with the action that issues it.
    pub fn set_action_name(&self, name: &str) {
        let mut current = self.inner.action_name.lock();
        current.clear();
        current.push_str(name);
    }

    /// Whether both handles point at the same live state.
    pub fn ptr_eq(&self, other: &StoreState<S>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Flip the store to activated; true only for the first caller.
    pub(crate) fn activate(&self) -> bool {
        !self.inner.activated.swap(true, Ordering::SeqCst)
    }

    /// Terminal stage: compute the next state, commit only if it differs.
    fn update(&self, arg: Value) -> Result<Outcome> {
        let mut output = None;
        let committed = {
            let _serial = self.inner.mutation.lock();
            let current = self.get_state();
            let next = self.apply_mutator(&current, arg, &mut |out| output = Some(out))?;
            self.store_if_changed(&current, next)
        };
        if committed {
            self.schedule_notify();
        }
        Ok(output)
    }

    /// Terminal stage of [`restore`](Self::restore).
    fn replace(&self, state: Value) -> Result<Outcome> {
        let next: S = serde_json::from_value(state)?;
        let committed = {
            let _serial = self.inner.mutation.lock();
            let current = self.get_state();
            self.store_if_changed(&current, next)
        };
        if committed {
            self.schedule_notify();
        }
        Ok(None)
    }

    fn store_if_changed(&self, current: &S, next: S) -> bool {
        if next == *current {
            tracing::trace!(store = %self.inner.key, "mutation produced an equal state, not committed");
            return false;
        }
        self.store(Arc::new(next));
        true
    }

    fn apply_mutator(&self, current: &S, arg: Value, capture: &mut dyn FnMut(Value)) -> Result<S> {
        if let Some(mutator) = &self.inner.mutator {
            return mutator(current, arg, capture);
        }
        let policy = self.inner.runtime.defaults.read().merge.clone();
        let merged = policy.apply(&self.inner.key, serde_json::to_value(current)?, arg)?;
        Ok(serde_json::from_value(merged)?)
    }

    fn commit(&self, next: Arc<S>) {
        {
            let _serial = self.inner.mutation.lock();
            self.store(next);
        }
        self.schedule_notify();
    }

    fn store(&self, next: Arc<S>) {
        *self.inner.state.write() = next;
        self.inner.revision.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(store = %self.inner.key, action = %self.action_name(), "state committed");
    }

    fn schedule_notify(&self) {
        let batched = self.inner.runtime.defaults.read().batch_updates;
        if !batched {
            self.notify();
            return;
        }
        let store = Arc::downgrade(&self.inner);
        self.inner.runtime.scheduler.schedule(
            self.inner.id,
            Arc::new(move || {
                if let Some(inner) = store.upgrade() {
                    StoreState { inner }.notify();
                }
            }),
        );
    }
}

impl<S: StoreValue> StoreView for StoreState<S> {
    fn key(&self) -> &str {
        &self.inner.key
    }

    fn action_name(&self) -> String {
        StoreState::action_name(self)
    }

    fn set_action_name(&self, name: &str) {
        StoreState::set_action_name(self, name)
    }

    fn snapshot(&self) -> Result<Value> {
        Ok(serde_json::to_value(&*self.get_state())?)
    }

    fn listener_count(&self) -> usize {
        StoreState::listener_count(self)
    }

    fn mutate(&self, arg: Value) -> Result<Outcome> {
        StoreState::mutate(self, arg)
    }

    fn restore(&self, state: Value) -> Result<Outcome> {
        StoreState::restore(self, state)
    }

    fn revision(&self) -> u64 {
        StoreState::revision(self)
    }

    fn reset_state(&self) {
        StoreState::reset_state(self)
    }
}

impl<S> std::fmt::Debug for StoreState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreState")
            .field("key", &self.inner.key)
            .field("listeners", &self.inner.listeners.read().len())
            .finish_non_exhaustive()
    }
}

/// RAII guard for a store listener.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}
