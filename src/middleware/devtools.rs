//! Bridge to an external time-travel inspector.
//!
//! Every mutation that commits on a connected store is mirrored to the
//! inspector together with the committed state. The inspector can send
//! history commands back; those re-enter the store's normal pipeline and
//! replace the state with the recorded one.
//! Inspector failures are logged and dropped here and never reach the
//! mutation pipeline.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::{Middleware, Next, Outcome};
use crate::error::{DevtoolsError, Result};
use crate::store::StoreView;

/// Action names starting with this prefix come from replays and are not
/// echoed back to the inspector.
pub const REPLAY_PREFIX: &str = "devtools.";

/// The message mirrored to the inspector for each mutation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DevtoolsAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

/// A connection to an external inspector.
pub trait Devtools: Send + Sync {
    /// (Re)set the inspector's baseline for `store`.
    fn init(&self, store: &str, state: &Value) -> Result<(), DevtoolsError>;

    fn send(&self, store: &str, action: &DevtoolsAction, state: &Value)
        -> Result<(), DevtoolsError>;
}

/// History commands an inspector can send back.
#[derive(Clone, Debug, PartialEq)]
pub enum DevtoolsMessage {
    Reset,
    Commit,
    Rollback(Value),
    JumpToAction(Value),
    JumpToState(Value),
}

impl DevtoolsMessage {
    fn kind(&self) -> &'static str {
        match self {
            DevtoolsMessage::Reset => "RESET",
            DevtoolsMessage::Commit => "COMMIT",
            DevtoolsMessage::Rollback(_) => "ROLLBACK",
            DevtoolsMessage::JumpToAction(_) => "JUMP_TO_ACTION",
            DevtoolsMessage::JumpToState(_) => "JUMP_TO_STATE",
        }
    }
}

pub struct DevtoolsMiddleware {
    tool: Arc<dyn Devtools>,
}

impl DevtoolsMiddleware {
    pub fn new(tool: Arc<dyn Devtools>) -> Self {
        Self { tool }
    }
}

impl Middleware for DevtoolsMiddleware {
    fn handle(&self, store: &dyn StoreView, arg: Value, next: Next<'_>) -> Result<Outcome> {
        let payload = arg.clone();
        let revision = store.revision();
        let result = next(arg)?;
        if store.revision() == revision {
            return Ok(result);
        }
        let kind = store.action_name();
        if !kind.starts_with(REPLAY_PREFIX) {
            let action = DevtoolsAction { kind, payload };
            isolate(store.key(), || {
                let state = store.snapshot().map_err(|e| DevtoolsError::Rejected(e.to_string()))?;
                self.tool.send(store.key(), &action, &state)
            });
        }
        Ok(result)
    }
}

/// Send the store's current state as the inspector's baseline.
pub fn connect(store: &dyn StoreView, tool: &dyn Devtools) {
    isolate(store.key(), || {
        let state = store.snapshot().map_err(|e| DevtoolsError::Rejected(e.to_string()))?;
        tool.init(store.key(), &state)
    });
}

/// Apply a history command received from the inspector.
///
/// Errors from the store pipeline (for example a state the store type
/// cannot deserialize) are returned; inspector errors are swallowed.
pub fn replay(store: &dyn StoreView, tool: &dyn Devtools, message: DevtoolsMessage) -> Result<()> {
    tracing::debug!(store = store.key(), kind = message.kind(), "devtools replay");
    let label = format!("{REPLAY_PREFIX}{}", message.kind());
    match message {
        DevtoolsMessage::Reset => {
            store.reset_state();
            connect(store, tool);
        }
        DevtoolsMessage::Commit => connect(store, tool),
        DevtoolsMessage::Rollback(state) => {
            store.set_action_name(&label);
            store.restore(state)?;
            connect(store, tool);
        }
        DevtoolsMessage::JumpToAction(state) | DevtoolsMessage::JumpToState(state) => {
            store.set_action_name(&label);
            store.restore(state)?;
        }
    }
    Ok(())
}

fn isolate(store: &str, f: impl FnOnce() -> Result<(), DevtoolsError>) {
    if let Err(err) = f() {
        tracing::warn!(store, %err, "devtools error ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionApi;
    use crate::runtime::Runtime;
    use crate::scheduler::FlushMode;
    use crate::store::{ActionResult, StoreDefinition};
    use crate::store::Registry;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::OnceLock;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Count {
        count: i64,
    }

    #[derive(Default)]
    struct Recorder {
        inits: Mutex<Vec<Value>>,
        sent: Mutex<Vec<(DevtoolsAction, Value)>>,
        broken: bool,
    }

    impl Devtools for Recorder {
        fn init(&self, _store: &str, state: &Value) -> Result<(), DevtoolsError> {
            if self.broken {
                return Err(DevtoolsError::Disconnected);
            }
            self.inits.lock().push(state.clone());
            Ok(())
        }

        fn send(&self, _store: &str, action: &DevtoolsAction, state: &Value) -> Result<(), DevtoolsError> {
            if self.broken {
                return Err(DevtoolsError::Rejected("extension crashed".into()));
            }
            self.sent.lock().push((action.clone(), state.clone()));
            Ok(())
        }
    }

    fn counter() -> Arc<StoreDefinition<Count>> {
        StoreDefinition::builder(Count { count: 0 })
            .named("counter")
            .action("increment", |_args: Value| {
                |api: &ActionApi<Count>, _: &()| -> ActionResult {
                    api.set_state(json!({"count": api.get_state().count + 1}))?;
                    Ok(Value::Null)
                }
            })
            .build()
    }

    fn instrumented(tool: Arc<Recorder>) -> Runtime {
        let runtime = Runtime::new();
        runtime.scheduler().set_mode(FlushMode::Manual);
        runtime.configure(|defaults| defaults.devtools = true);
        runtime.set_devtools(tool);
        runtime
    }

    #[test]
    fn mutations_are_mirrored_with_their_action_name() {
        let tool = Arc::new(Recorder::default());
        let runtime = instrumented(Arc::clone(&tool));
        let handle = runtime.registry().get_store(&counter(), None).unwrap();
        assert_eq!(*tool.inits.lock(), vec![json!({"count": 0})]);

        handle.actions.call("increment", Value::Null).unwrap();
        let sent = tool.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.kind, "increment");
        assert_eq!(sent[0].0.payload, json!({"count": 1}));
        assert_eq!(sent[0].1, json!({"count": 1}));
        assert_eq!(serde_json::to_value(&sent[0].0).unwrap()["type"], "increment");
    }

    #[test]
    fn equal_state_is_not_mirrored() {
        let tool = Arc::new(Recorder::default());
        let runtime = instrumented(Arc::clone(&tool));
        let handle = runtime.registry().get_store(&counter(), None).unwrap();

        handle.state.set_action_name("noop");
        handle.state.mutate(json!({"count": 0})).unwrap();
        assert!(tool.sent.lock().is_empty());

        handle.actions.call("increment", Value::Null).unwrap();
        assert_eq!(tool.sent.lock().len(), 1);
    }

    #[test]
    fn disabled_devtools_are_not_connected() {
        let tool = Arc::new(Recorder::default());
        let runtime = Runtime::new();
        runtime.set_devtools(Arc::clone(&tool) as Arc<dyn Devtools>);
        let handle = runtime.registry().get_store(&counter(), None).unwrap();
        handle.actions.call("increment", Value::Null).unwrap();
        assert!(tool.inits.lock().is_empty());
        assert!(tool.sent.lock().is_empty());
    }

    #[test]
    fn inspector_failures_never_reach_the_store() {
        let tool = Arc::new(Recorder {
            broken: true,
            ..Recorder::default()
        });
        let runtime = instrumented(tool);
        let handle = runtime.registry().get_store(&counter(), None).unwrap();
        handle.actions.call("increment", Value::Null).unwrap();
        assert_eq!(handle.state.get_state().count, 1);
    }

    #[test]
    fn jumps_replay_through_the_pipeline_without_echo() {
        let tool = Arc::new(Recorder::default());
        let runtime = instrumented(Arc::clone(&tool));
        let handle = runtime.registry().get_store(&counter(), None).unwrap();
        handle.actions.call("increment", Value::Null).unwrap();

        replay(&handle.state, tool.as_ref(), DevtoolsMessage::JumpToState(json!({"count": 7}))).unwrap();
        assert_eq!(handle.state.get_state().count, 7);
        assert_eq!(tool.sent.lock().len(), 1);
    }

    #[test]
    fn jumps_restore_the_recorded_state_exactly() {
        let tool = Arc::new(Recorder::default());
        let runtime = instrumented(Arc::clone(&tool));
        let def = StoreDefinition::<Value>::builder(json!({"title": "draft"}))
            .named("doc")
            .build();
        let handle = runtime.registry().get_store(&def, None).unwrap();
        handle.state.mutate(json!({"published": true})).unwrap();
        assert_eq!(*handle.state.get_state(), json!({"title": "draft", "published": true}));

        replay(&handle.state, tool.as_ref(), DevtoolsMessage::JumpToState(json!({"title": "draft"}))).unwrap();
        assert_eq!(*handle.state.get_state(), json!({"title": "draft"}));

        replay(&handle.state, tool.as_ref(), DevtoolsMessage::Rollback(json!({"title": "first"}))).unwrap();
        assert_eq!(*handle.state.get_state(), json!({"title": "first"}));
    }

    struct RegistryReader {
        registry: OnceLock<Registry>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl Devtools for RegistryReader {
        fn init(&self, _store: &str, _state: &Value) -> Result<(), DevtoolsError> {
            if let Some(registry) = self.registry.get() {
                self.seen.lock().push(registry.keys());
            }
            Ok(())
        }

        fn send(&self, _store: &str, _action: &DevtoolsAction, _state: &Value) -> Result<(), DevtoolsError> {
            Ok(())
        }
    }

    #[test]
    fn inspector_may_read_the_registry_on_connect() {
        let tool = Arc::new(RegistryReader {
            registry: OnceLock::new(),
            seen: Mutex::new(Vec::new()),
        });
        let runtime = Runtime::new();
        runtime.configure(|defaults| defaults.devtools = true);
        runtime.set_devtools(Arc::clone(&tool) as Arc<dyn Devtools>);
        let _ = tool.registry.set(runtime.registry().clone());

        runtime.registry().get_store(&counter(), None).unwrap();
        assert_eq!(*tool.seen.lock(), vec![vec!["counter@__global__".to_string()]]);
    }

    #[test]
    fn reset_and_rollback_reinitialize_the_inspector() {
        let tool = Arc::new(Recorder::default());
        let runtime = instrumented(Arc::clone(&tool));
        let handle = runtime.registry().get_store(&counter(), None).unwrap();
        handle.actions.call("increment", Value::Null).unwrap();

        replay(&handle.state, tool.as_ref(), DevtoolsMessage::Rollback(json!({"count": 3}))).unwrap();
        assert_eq!(handle.state.get_state().count, 3);
        replay(&handle.state, tool.as_ref(), DevtoolsMessage::Reset).unwrap();
        assert_eq!(handle.state.get_state().count, 0);
        replay(&handle.state, tool.as_ref(), DevtoolsMessage::Commit).unwrap();
        assert_eq!(
            *tool.inits.lock(),
            vec![json!({"count": 0}), json!({"count": 3}), json!({"count": 0}), json!({"count": 0})]
        );
    }

    #[test]
    fn undeserializable_jump_is_an_error() {
        let tool = Arc::new(Recorder::default());
        let runtime = instrumented(Arc::clone(&tool));
        let handle = runtime.registry().get_store(&counter(), None).unwrap();
        let result = replay(&handle.state, tool.as_ref(), DevtoolsMessage::JumpToAction(json!({"count": "x"})));
        assert!(result.is_err());
        assert_eq!(handle.state.get_state().count, 0);
    }
}
