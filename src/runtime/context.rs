use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{RwLock, RwLockReadGuard};

use super::defaults::{Defaults, Settings};
use crate::middleware::devtools::Devtools;
use crate::middleware::Middleware;
use crate::scheduler::Scheduler;
use crate::scope::Scope;
use crate::store::Registry;

/// Inner runtime state shared by every store the runtime creates.
pub(crate) struct RuntimeInner {
    next_id: AtomicU64,
    pub(crate) defaults: RwLock<Defaults>,
    pub(crate) scheduler: Scheduler,
}

impl RuntimeInner {
    fn new(settings: &Settings) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            defaults: RwLock::new(Defaults::from_settings(settings)),
            scheduler: Scheduler::new(settings.flush),
        }
    }

    /// Generate the next unique id for a store state.
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Owner of the shared store registry, the notification scheduler and the
/// process defaults.
///
/// A runtime is constructed explicitly and handed to whatever resolves
/// stores. For code that cannot thread it through, [`Runtime::current`]
/// falls back to a lazily created global instance, and [`Runtime::scope`]
/// gives a test its own isolated runtime.
///
/// # Examples
///
/// ```
/// use canopy::runtime::Runtime;
///
/// let runtime = Runtime::new();
/// assert!(runtime.registry().is_empty());
/// ```
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use canopy::runtime::Runtime;
///
/// Runtime::scope(|| {
///     let runtime = Runtime::current();
///     assert!(runtime.registry().is_empty());
/// });
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
    registry: Registry,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Runtime>> = const { RefCell::new(Vec::new()) };
}

impl Runtime {
    /// Create a runtime with default settings.
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        let inner = Arc::new(RuntimeInner::new(settings));
        let registry = Registry::shared(Arc::clone(&inner));
        tracing::debug!(?settings, "runtime created");
        Self { inner, registry }
    }

    /// Run a function with a fresh isolated runtime as the current one.
    ///
    /// The runtime and all its stores are dropped when the function returns
    /// (unless the function leaks a handle).
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(), f)
    }

    /// Get or create the global runtime (fallback).
    pub fn global() -> Self {
        static RUNTIME: OnceLock<Runtime> = OnceLock::new();
        RUNTIME
            .get_or_init(|| Self::with_settings(&Settings::from_env()))
            .clone()
    }

    /// The runtime on top of the thread-local stack, or the global one.
    pub fn current() -> Self {
        RUNTIME_STACK
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(Self::global)
    }

    /// Run a function with a specific runtime as the current context.
    pub fn with_runtime<F, R>(runtime: Runtime, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// The shared registry (default scope `__global__`).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Resolution root: no enclosing boundaries, falls back to the shared registry.
    pub fn root_scope(&self) -> Scope {
        Scope::root(&self.registry)
    }

    /// A fresh registry for a scoping boundary (default scope `__local__`).
    pub fn local_registry(&self) -> Registry {
        Registry::local(Arc::clone(&self.inner))
    }

    pub fn defaults(&self) -> RwLockReadGuard<'_, Defaults> {
        self.inner.defaults.read()
    }

    /// Mutate the defaults in place. Stores created earlier keep the
    /// middleware chain they were built with.
    pub fn configure<F>(&self, f: F)
    where
        F: FnOnce(&mut Defaults),
    {
        f(&mut self.inner.defaults.write());
    }

    /// Apply the plain-data settings on top of the current defaults.
    pub fn apply_settings(&self, settings: &Settings) {
        self.configure(|defaults| {
            defaults.devtools = settings.devtools;
            defaults.batch_updates = settings.batch_updates;
            defaults.merge = settings.merge.into();
        });
        self.inner.scheduler.set_mode(settings.flush);
    }

    /// Append a middleware; it wraps every store created afterwards.
    pub fn add_middleware<M>(&self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.inner.defaults.write().middlewares.push(Arc::new(middleware));
    }

    /// Install the inspector that newly created stores connect to while
    /// `devtools` is enabled.
    pub fn set_devtools(&self, connection: Arc<dyn Devtools>) {
        self.inner.defaults.write().devtools_connection = Some(connection);
    }

    pub(crate) fn inner(&self) -> &Arc<RuntimeInner> {
        &self.inner
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
