use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{Boundary, Claim, Scope};
use crate::action::{ActionApi, PropsProvider};
use crate::error::Result;
use crate::runtime::Runtime;
use crate::store::{
    ActionResult, ContainerKind, DefinitionId, DefinitionMeta, Props, Registry, StoreDefinition,
    StoreHandle, StoreValue,
};

/// Lifecycle handler run as an action of the container's store.
pub type Hook<S, P> = Arc<dyn Fn(&ActionApi<S, P>, &P) -> ActionResult + Send + Sync>;

/// Boundary that owns one store definition.
///
/// Unscoped containers keep their store in a registry of their own, so two
/// of them never share state. Scoped and global containers keep it in the
/// runtime's shared registry under their scope id, so every container with
/// the same id shares one instance.
pub struct Container<S, P = ()> {
    definition: Arc<StoreDefinition<S, P>>,
    scope_id: Option<String>,
    global: bool,
    kind: Option<ContainerKind>,
    props: Arc<RwLock<P>>,
    provider: PropsProvider<P>,
    local: Registry,
    shared: Registry,
    on_init: Option<Hook<S, P>>,
    on_update: Option<Hook<S, P>>,
    on_cleanup: Option<Hook<S, P>>,
    handle: Mutex<Option<StoreHandle<S, P>>>,
}

impl<S: StoreValue, P: Props> Container<S, P> {
    pub fn builder(definition: &Arc<StoreDefinition<S, P>>) -> ContainerBuilder<S, P> {
        ContainerBuilder {
            definition: Arc::clone(definition),
            scope_id: None,
            global: false,
            kind: None,
            props: P::default(),
            on_init: None,
            on_update: None,
            on_cleanup: None,
        }
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    pub fn props(&self) -> P {
        self.props.read().clone()
    }

    /// The store this container resolved at mount, if mounted.
    pub fn handle(&self) -> Option<StoreHandle<S, P>> {
        self.handle.lock().clone()
    }

    fn registry(&self) -> &Registry {
        if self.global || self.scope_id.is_some() {
            &self.shared
        } else {
            &self.local
        }
    }

    /// Enter the container below `parent`.
    ///
    /// The container's own handle reads this container's props and
    /// dispatches through the returned scope. `on_init` runs synchronously
    /// the first time the store becomes active, so anything it commits is
    /// visible before the caller continues.
    pub fn mount(self: &Arc<Self>, parent: &Scope) -> Result<Scope> {
        let scope = parent.nest(self);
        let handle = self
            .registry()
            .get_store(&self.definition, self.scope_id.as_deref())?;
        let handle = StoreHandle {
            state: handle.state,
            actions: handle
                .actions
                .with_props(Arc::clone(&self.provider))
                .with_scope(scope.clone()),
        };
        *self.handle.lock() = Some(handle.clone());
        tracing::debug!(store = handle.state.key(), "container mounted");

        if handle.state.activate() {
            if let Some(on_init) = &self.on_init {
                handle.actions.run("onInit", |api, props| on_init(api, props))?;
            }
        }
        Ok(scope)
    }

    /// Replace the props and run `on_update`.
    pub fn update_props(&self, props: P) -> Result<()> {
        *self.props.write() = props;
        let handle = self.handle();
        if let (Some(handle), Some(on_update)) = (handle, &self.on_update) {
            handle.actions.run("onUpdate", |api, props| on_update(api, props))?;
        }
        Ok(())
    }

    /// Leave the container. The store is deleted, after `on_cleanup`, only
    /// if nothing listens to it anymore. Returns whether it was deleted.
    pub fn teardown(&self) -> Result<bool> {
        let Some(handle) = self.handle() else {
            return Ok(false);
        };
        if handle.state.listener_count() > 0 {
            tracing::debug!(store = handle.state.key(), "container teardown kept a listened store");
            return Ok(false);
        }
        if let Some(on_cleanup) = &self.on_cleanup {
            handle.actions.run("onCleanup", |api, props| on_cleanup(api, props))?;
        }
        self.registry().delete_key(handle.state.key());
        *self.handle.lock() = None;
        tracing::debug!(store = handle.state.key(), "container torn down");
        Ok(true)
    }
}

impl<S: StoreValue, P: Props> Boundary for Container<S, P> {
    fn claim(&self, meta: &DefinitionMeta, requested: Option<&str>) -> Option<Claim> {
        let owns = if meta.id == self.definition.id() {
            requested.is_none() || self.global || requested == self.scope_id.as_deref()
        } else {
            matches!(
                (&meta.contained_by, &self.kind),
                (Some(wanted), Some(own)) if wanted == own
            )
        };
        owns.then(|| {
            let scope_id = requested.map(str::to_string).or_else(|| self.scope_id.clone());
            Claim::new(self.registry().clone(), scope_id).with_props(Arc::clone(&self.provider))
        })
    }
}

impl<S, P> std::fmt::Debug for Container<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("store", &self.definition.meta().label())
            .field("scope_id", &self.scope_id)
            .field("global", &self.global)
            .finish_non_exhaustive()
    }
}

pub struct ContainerBuilder<S, P = ()> {
    definition: Arc<StoreDefinition<S, P>>,
    scope_id: Option<String>,
    global: bool,
    kind: Option<ContainerKind>,
    props: P,
    on_init: Option<Hook<S, P>>,
    on_update: Option<Hook<S, P>>,
    on_cleanup: Option<Hook<S, P>>,
}

impl<S: StoreValue, P: Props> ContainerBuilder<S, P> {
    pub fn scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Own the store for every requested scope id.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Also claim stores declared as contained by `kind`.
    pub fn kind(mut self, kind: &ContainerKind) -> Self {
        self.kind = Some(kind.clone());
        self
    }

    pub fn props(mut self, props: P) -> Self {
        self.props = props;
        self
    }

    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionApi<S, P>, &P) -> ActionResult + Send + Sync + 'static,
    {
        self.on_init = Some(Arc::new(hook));
        self
    }

    pub fn on_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionApi<S, P>, &P) -> ActionResult + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(hook));
        self
    }

    pub fn on_cleanup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionApi<S, P>, &P) -> ActionResult + Send + Sync + 'static,
    {
        self.on_cleanup = Some(Arc::new(hook));
        self
    }

    pub fn build(self, runtime: &Runtime) -> Arc<Container<S, P>> {
        let props = Arc::new(RwLock::new(self.props));
        let current = Arc::clone(&props);
        let provider: PropsProvider<P> = Arc::new(move || current.read().clone());
        Arc::new(Container {
            definition: self.definition,
            scope_id: self.scope_id,
            global: self.global,
            kind: self.kind,
            props,
            provider,
            local: runtime.local_registry(),
            shared: runtime.registry().clone(),
            on_init: self.on_init,
            on_update: self.on_update,
            on_cleanup: self.on_cleanup,
            handle: Mutex::new(None),
        })
    }
}

/// How a [`DynamicContainer`] decides which definitions it owns.
#[derive(Clone)]
pub enum Matcher {
    Definition(DefinitionId),
    Kind(ContainerKind),
    Tag(String),
    Predicate(Arc<dyn Fn(&DefinitionMeta) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&DefinitionMeta) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, meta: &DefinitionMeta) -> bool {
        match self {
            Matcher::Definition(id) => meta.id == *id,
            Matcher::Kind(kind) => meta.contained_by.as_ref() == Some(kind),
            Matcher::Tag(tag) => meta.has_tag(tag),
            Matcher::Predicate(f) => f(meta),
        }
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Definition(id) => f.debug_tuple("Definition").field(id).finish(),
            Matcher::Kind(kind) => f.debug_tuple("Kind").field(&kind.name()).finish(),
            Matcher::Tag(tag) => f.debug_tuple("Tag").field(tag).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Boundary that owns every definition its [`Matcher`] accepts, each in a
/// registry private to the container.
#[derive(Debug)]
pub struct DynamicContainer {
    matcher: Matcher,
    local: Registry,
}

impl DynamicContainer {
    pub fn new(runtime: &Runtime, matcher: Matcher) -> Arc<Self> {
        Arc::new(Self {
            matcher,
            local: runtime.local_registry(),
        })
    }

    pub fn mount(self: &Arc<Self>, parent: &Scope) -> Scope {
        tracing::debug!(matcher = ?self.matcher, "dynamic container mounted");
        parent.nest(self)
    }

    /// Stores currently owned by this container.
    pub fn registry(&self) -> &Registry {
        &self.local
    }

    /// Delete every owned store nobody listens to. Returns the removed keys.
    pub fn teardown(&self) -> Vec<String> {
        let removed = self.local.delete_unobserved();
        tracing::debug!(removed = removed.len(), "dynamic container torn down");
        removed
    }
}

impl Boundary for DynamicContainer {
    fn claim(&self, meta: &DefinitionMeta, requested: Option<&str>) -> Option<Claim> {
        self.matcher
            .matches(meta)
            .then(|| Claim::new(self.local.clone(), requested.map(str::to_string)))
    }
}
