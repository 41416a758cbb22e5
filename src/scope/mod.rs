//! Scope resolution.
//!
//! A [`Scope`] is the chain of boundaries enclosing a consumer, nearest
//! first, plus the runtime's shared registry as the fallback. Resolving a
//! definition walks the chain and stops at the first boundary that claims
//! it. Resolution depends only on the chain at call time, never on the
//! order in which boundaries were mounted.

mod container;

use std::any::Any;
use std::sync::{Arc, Weak};

pub use container::{Container, ContainerBuilder, DynamicContainer, Hook, Matcher};

use crate::action::PropsProvider;
use crate::error::{Result, StoreError};
use crate::store::{DefinitionMeta, Props, Registry, StoreDefinition, StoreHandle, StoreValue, WeakRegistry};

/// Where a boundary wants a claimed definition to live.
pub struct Claim {
    pub registry: Registry,
    pub scope_id: Option<String>,
    props: Option<Arc<dyn Any + Send + Sync>>,
}

impl Claim {
    pub fn new(registry: Registry, scope_id: Option<String>) -> Self {
        Self {
            registry,
            scope_id,
            props: None,
        }
    }

    /// Have actions resolved through this claim read props from `provider`.
    /// Only definitions whose props type is `P` pick it up.
    pub fn with_props<P: Props>(mut self, provider: PropsProvider<P>) -> Self {
        self.props = Some(Arc::new(provider));
        self
    }

    fn props<P: Props>(&self) -> Option<PropsProvider<P>> {
        self.props
            .as_ref()
            .and_then(|props| props.downcast_ref::<PropsProvider<P>>())
            .cloned()
    }
}

/// A scoping boundary in the consumer tree.
pub trait Boundary: Send + Sync {
    /// The registry and scope id to resolve `meta` against, or `None` if
    /// this boundary does not own it. `requested` is the scope id the
    /// consumer asked for explicitly.
    fn claim(&self, meta: &DefinitionMeta, requested: Option<&str>) -> Option<Claim>;
}

struct ScopeNode {
    boundary: Weak<dyn Boundary>,
    parent: Option<Arc<ScopeNode>>,
}

/// Resolution context: enclosing boundaries plus the shared registry.
///
/// Cloning is cheap. A scope holds its boundaries and registry weakly, so
/// it never keeps a torn-down container alive.
#[derive(Clone)]
pub struct Scope {
    global: WeakRegistry,
    chain: Option<Arc<ScopeNode>>,
}

impl Scope {
    /// A scope with no boundaries, resolving everything in `registry`.
    pub fn root(registry: &Registry) -> Self {
        Self::detached(registry.downgrade())
    }

    pub(crate) fn detached(global: WeakRegistry) -> Self {
        Self { global, chain: None }
    }

    /// This scope with `boundary` as the new nearest ancestor.
    pub fn nest<B: Boundary + 'static>(&self, boundary: &Arc<B>) -> Self {
        let weak: Weak<B> = Arc::downgrade(boundary);
        let boundary: Weak<dyn Boundary> = weak;
        Self {
            global: self.global.clone(),
            chain: Some(Arc::new(ScopeNode {
                boundary,
                parent: self.chain.clone(),
            })),
        }
    }

    /// Number of live boundaries in the chain.
    pub fn depth(&self) -> usize {
        self.boundaries().count()
    }

    fn boundaries(&self) -> impl Iterator<Item = Arc<dyn Boundary>> + '_ {
        std::iter::successors(self.chain.as_deref(), |node| node.parent.as_deref())
            .filter_map(|node| node.boundary.upgrade())
    }

    /// Resolve `definition` to a live store.
    ///
    /// The returned actions dispatch through this scope and read the props
    /// of the boundary that claimed the definition. A definition that
    /// declares a containing kind fails with [`StoreError::NotContained`]
    /// when no enclosing boundary claims it.
    pub fn resolve<S: StoreValue, P: Props>(
        &self,
        definition: &Arc<StoreDefinition<S, P>>,
        scope_id: Option<&str>,
    ) -> Result<StoreHandle<S, P>> {
        let meta = definition.meta();
        let claim = self.boundaries().find_map(|boundary| boundary.claim(meta, scope_id));
        let handle = match claim {
            Some(claim) => {
                let handle = claim.registry.get_store(definition, claim.scope_id.as_deref())?;
                match claim.props::<P>() {
                    Some(provider) => StoreHandle {
                        actions: handle.actions.with_props(provider),
                        state: handle.state,
                    },
                    None => handle,
                }
            }
            None => {
                if let Some(kind) = &meta.contained_by {
                    return Err(StoreError::NotContained {
                        store: meta.label(),
                        container: kind.name().to_string(),
                    });
                }
                self.global.upgrade()?.get_store(definition, scope_id)?
            }
        };
        Ok(handle.with_scope(self.clone()))
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").field("depth", &self.depth()).finish()
    }
}
