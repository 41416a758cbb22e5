use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::middleware::Outcome;
use crate::scope::Scope;
use crate::store::{
    ActionCreator, ActionResult, Props, StoreDefinition, StoreHandle, StoreState, StoreValue,
};

/// Supplies the current container props each time an action runs.
pub type PropsProvider<P> = Arc<dyn Fn() -> P + Send + Sync>;

/// Every action of one definition, bound to one live store.
pub struct BoundActions<S, P = ()> {
    definition: Arc<StoreDefinition<S, P>>,
    state: StoreState<S>,
    props: PropsProvider<P>,
    scope: Scope,
}

impl<S, P> Clone for BoundActions<S, P> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            state: self.state.clone(),
            props: Arc::clone(&self.props),
            scope: self.scope.clone(),
        }
    }
}

impl<S: StoreValue, P: Props> BoundActions<S, P> {
    pub(crate) fn new(
        definition: Arc<StoreDefinition<S, P>>,
        state: StoreState<S>,
        props: PropsProvider<P>,
        scope: Scope,
    ) -> Self {
        Self {
            definition,
            state,
            props,
            scope,
        }
    }

    /// Invoke the action registered as `name` with `args`.
    pub fn call(&self, name: &str, args: Value) -> ActionResult {
        match self.get(name) {
            Some(action) => action.call(args),
            None => Err(StoreError::UnknownAction {
                store: self.definition.meta().label(),
                action: name.to_string(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<BoundAction<S, P>> {
        self.definition
            .action(name)
            .map(|creator| bind_action(Arc::clone(creator), name, self))
    }

    pub fn names(&self) -> Vec<&str> {
        self.definition.action_names().collect()
    }

    /// Run an ad-hoc thunk under `label` and return whatever it returns.
    ///
    /// The return type is free, so a thunk may hand back a future that keeps
    /// a clone of the API and sets state after an `.await`.
    pub fn run<R>(&self, label: impl Into<String>, thunk: impl FnOnce(&ActionApi<S, P>, &P) -> R) -> R {
        let api = ActionApi {
            actions: self.clone(),
            label: label.into(),
        };
        let props = (self.props)();
        thunk(&api, &props)
    }

    pub fn state(&self) -> &StoreState<S> {
        &self.state
    }

    pub fn definition(&self) -> &Arc<StoreDefinition<S, P>> {
        &self.definition
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn with_props(self, props: PropsProvider<P>) -> Self {
        Self { props, ..self }
    }

    pub fn with_scope(self, scope: Scope) -> Self {
        Self { scope, ..self }
    }
}

impl<S, P> std::fmt::Debug for BoundActions<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundActions")
            .field("store", &self.definition.meta().label())
            .finish_non_exhaustive()
    }
}

/// A single action creator bound to a store.
pub struct BoundAction<S, P = ()> {
    creator: ActionCreator<S, P>,
    name: String,
    siblings: BoundActions<S, P>,
}

impl<S: StoreValue, P: Props> BoundAction<S, P> {
    /// Build the thunk from `args` and run it with fresh props.
    pub fn call(&self, args: Value) -> ActionResult {
        let thunk = (self.creator)(args);
        self.siblings.run(self.name.as_str(), thunk)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Bind `creator` under `name` to the store and props behind `siblings`.
pub fn bind_action<S: StoreValue, P: Props>(
    creator: ActionCreator<S, P>,
    name: &str,
    siblings: &BoundActions<S, P>,
) -> BoundAction<S, P> {
    BoundAction {
        creator,
        name: name.to_string(),
        siblings: siblings.clone(),
    }
}

/// The capabilities a thunk runs with.
pub struct ActionApi<S, P = ()> {
    actions: BoundActions<S, P>,
    label: String,
}

impl<S, P> Clone for ActionApi<S, P> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            label: self.label.clone(),
        }
    }
}

impl<S: StoreValue, P: Props> ActionApi<S, P> {
    pub fn get_state(&self) -> Arc<S> {
        self.actions.state.get_state()
    }

    /// Send `partial` through the store's pipeline, labelled with this
    /// action's name. Nothing is committed if any stage fails.
    pub fn set_state<T: Serialize>(&self, partial: T) -> Result<Outcome> {
        let patch = serde_json::to_value(partial)?;
        self.actions.state.set_action_name(&self.label);
        self.actions.state.mutate(patch)
    }

    /// Sibling actions of the same store.
    pub fn actions(&self) -> &BoundActions<S, P> {
        &self.actions
    }

    pub fn action_name(&self) -> &str {
        &self.label
    }

    /// Props as they are now, not as they were when the action started.
    pub fn props(&self) -> P {
        (self.actions.props)()
    }

    /// Run another thunk against the same store.
    pub fn dispatch<R>(&self, thunk: impl FnOnce(&ActionApi<S, P>, &P) -> R) -> R {
        self.actions.run(format!("{}.dispatch", self.label), thunk)
    }

    /// Run a thunk against whichever instance of `definition` this store's
    /// scope resolves to right now.
    pub fn dispatch_to<S2, P2, R>(
        &self,
        definition: &Arc<StoreDefinition<S2, P2>>,
        thunk: impl FnOnce(&ActionApi<S2, P2>, &P2) -> R,
    ) -> Result<R>
    where
        S2: StoreValue,
        P2: Props,
    {
        let StoreHandle { actions, .. } = self.actions.scope.resolve(definition, None)?;
        Ok(actions.run(format!("{}.dispatchTo", self.label), thunk))
    }
}
