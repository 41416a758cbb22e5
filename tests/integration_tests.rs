//! Integration tests for Canopy

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use canopy::middleware::from_fn;
use canopy::prelude::*;
use canopy::store::Props;
use canopy::{ContainerKind, FlushMode, StoreError, StoreHandle, StoreSubscriber};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Counter {
    count: i64,
}

fn counter() -> Arc<StoreDefinition<Counter>> {
    StoreDefinition::builder(Counter { count: 0 })
        .named("counter")
        .action("increment", |_args: Value| {
            |api: &ActionApi<Counter>, _: &()| -> ActionResult {
                api.set_state(json!({"count": api.get_state().count + 1}))?;
                Ok(Value::Null)
            }
        })
        .action("add", |args: Value| {
            move |api: &ActionApi<Counter>, _: &()| -> ActionResult {
                let by = args.as_i64().unwrap_or(0);
                api.set_state(json!({"count": api.get_state().count + by}))?;
                Ok(Value::Null)
            }
        })
        .build()
}

fn manual_runtime() -> Runtime {
    let runtime = Runtime::new();
    runtime.scheduler().set_mode(FlushMode::Manual);
    runtime
}

/// Records the `count` of every notification a store delivers.
fn record<P: Props>(handle: &StoreHandle<Counter, P>) -> (Arc<Mutex<Vec<i64>>>, canopy::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = handle.state.subscribe(move |state| sink.lock().push(state.count));
    (seen, subscription)
}

#[test]
fn three_increments_notify_once() {
    let runtime = manual_runtime();
    let store = runtime.root_scope().resolve(&counter(), None).unwrap();
    let (seen, _subscription) = record(&store);

    for _ in 0..3 {
        store.actions.call("increment", Value::Null).unwrap();
    }
    assert!(seen.lock().is_empty());

    assert_eq!(runtime.scheduler().flush(), 1);
    assert_eq!(*seen.lock(), vec![3]);
}

#[tokio::test(flavor = "current_thread")]
async fn deferred_flush_runs_on_the_async_host() {
    let runtime = Runtime::new();
    let store = runtime.root_scope().resolve(&counter(), None).unwrap();
    let (seen, _subscription) = record(&store);

    for _ in 0..3 {
        store.actions.call("increment", Value::Null).unwrap();
    }
    assert!(seen.lock().is_empty());
    tokio::task::yield_now().await;
    assert_eq!(*seen.lock(), vec![3]);
}

#[test]
fn unbatched_runtime_notifies_every_commit() {
    let runtime = manual_runtime();
    runtime.configure(|defaults| defaults.batch_updates = false);
    let store = runtime.root_scope().resolve(&counter(), None).unwrap();
    let (seen, _subscription) = record(&store);

    for _ in 0..3 {
        store.actions.call("increment", Value::Null).unwrap();
    }
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
}

#[test]
fn get_store_is_stable_per_scope() {
    let runtime = Runtime::new();
    let def = counter();
    let registry = runtime.registry();

    let a = registry.get_store(&def, Some("s1")).unwrap();
    let b = registry.get_store(&def, Some("s1")).unwrap();
    let c = registry.get_store(&def, Some("s2")).unwrap();
    assert!(a.state.ptr_eq(&b.state));
    assert!(!a.state.ptr_eq(&c.state));
}

#[test]
fn delete_store_loses_prior_mutations() {
    let runtime = manual_runtime();
    let def = counter();
    let registry = runtime.registry();
    let store = registry.get_store(&def, None).unwrap();
    store.actions.call("add", json!(10)).unwrap();

    registry.delete_store(&def, None);
    let fresh = registry.get_store(&def, None).unwrap();
    assert_eq!(fresh.state.get_state().count, 0);
    assert_eq!(store.state.get_state().count, 10);
}

#[test]
fn configure_hydrates_before_first_lookup() {
    let runtime = Runtime::new();
    let def = counter();
    runtime.registry().configure(HashMap::from([(
        "counter@scope".to_string(),
        json!({"count": 5}),
    )]));

    let hydrated = runtime.root_scope().resolve(&def, Some("scope")).unwrap();
    assert_eq!(hydrated.state.get_state().count, 5);

    runtime.registry().delete_store(&def, Some("scope"));
    let again = runtime.registry().get_store(&def, Some("scope")).unwrap();
    assert_eq!(again.state.get_state().count, 5);
}

#[test]
fn dispatch_to_crosses_scopes() {
    let runtime = manual_runtime();
    let labels = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&labels);
    runtime.add_middleware(from_fn(move |store, arg, next| {
        sink.lock().push((store.key().to_string(), store.action_name()));
        next(arg)
    }));

    let target = counter();
    let source = StoreDefinition::<Counter>::builder(Counter { count: 0 })
        .named("source")
        .build();
    let scope = runtime.root_scope();
    let a = scope.resolve(&source, Some("s1")).unwrap();

    let forward = {
        let target = Arc::clone(&target);
        move |api: &ActionApi<Counter>, _: &()| -> ActionResult {
            api.dispatch_to(&target, |other, _| other.set_state(json!({"count": 9})))??;
            Ok(Value::Null)
        }
    };
    a.actions.run("sync", forward).unwrap();

    let b = scope.resolve(&target, None).unwrap();
    assert_eq!(b.state.get_state().count, 9);
    assert_eq!(a.state.get_state().count, 0);
    assert_eq!(
        *labels.lock(),
        vec![("counter@__global__".to_string(), "sync.dispatchTo".to_string())]
    );
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    title: String,
    done: bool,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct TodoList {
    items: Vec<Todo>,
    filter: String,
}

fn todo_list() -> Arc<StoreDefinition<TodoList>> {
    StoreDefinition::builder(TodoList {
        items: vec![
            Todo {
                title: "write".into(),
                done: true,
            },
            Todo {
                title: "test".into(),
                done: false,
            },
        ],
        filter: "all".into(),
    })
    .named("todos")
    .build()
}

#[derive(Debug, PartialEq)]
struct DoneCount {
    done_count: usize,
}

#[test]
fn unchanged_selection_is_not_delivered() {
    let runtime = manual_runtime();
    let store = runtime.root_scope().resolve(&todo_list(), None).unwrap();
    let state = store.state.clone();
    let done = create_memoized_selector(|s: &TodoList, _: &()| DoneCount {
        done_count: s.items.iter().filter(|t| t.done).count(),
    });
    let deliveries = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&deliveries);
    let subscriber = StoreSubscriber::new(store, done, (), move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    });
    let before = subscriber.current();

    state.mutate(json!({"filter": "active"})).unwrap();
    runtime.scheduler().flush();
    assert!(Arc::ptr_eq(&before, &subscriber.current()));
    assert_eq!(deliveries.load(Ordering::SeqCst), 0);

    state
        .mutate(json!({"items": [{"title": "write", "done": true}, {"title": "test", "done": true}]}))
        .unwrap();
    runtime.scheduler().flush();
    assert_eq!(subscriber.current().done_count, 2);
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
}

#[test]
fn composed_selector_over_a_store() {
    let runtime = Runtime::new();
    let store = runtime.registry().get_store(&todo_list(), None).unwrap();
    let total = create_memoized_selector(|s: &TodoList, _: &()| s.items.len());
    let done = create_memoized_selector(|s: &TodoList, _: &()| s.items.iter().filter(|t| t.done).count());
    let progress = create_selector((total, done), |total: &usize, done: &usize| {
        format!("{done}/{total}")
    });

    let first = progress.select(&store.state.get_state(), &());
    assert_eq!(*first, "1/2");
    store.state.mutate(json!({"filter": "done"})).unwrap();
    let second = progress.select(&store.state.get_state(), &());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(progress.recomputations(), 1);
}

#[test]
fn containers_scope_their_stores() {
    let runtime = manual_runtime();
    let def = counter();
    let left = Container::builder(&def).build(&runtime);
    let right = Container::builder(&def).build(&runtime);
    let root = runtime.root_scope();

    let left_store = left.mount(&root).unwrap().resolve(&def, None).unwrap();
    let right_store = right.mount(&root).unwrap().resolve(&def, None).unwrap();
    left_store.actions.call("increment", Value::Null).unwrap();

    assert_eq!(left_store.state.get_state().count, 1);
    assert_eq!(right_store.state.get_state().count, 0);
    assert_eq!(root.resolve(&def, None).unwrap().state.get_state().count, 0);
}

#[test]
fn resolution_follows_structure_not_mount_order() {
    let runtime = manual_runtime();
    let def = counter();
    let outer = Container::builder(&def).scope("outer").build(&runtime);
    let inner = Container::builder(&def).scope("inner").build(&runtime);
    let root = runtime.root_scope();

    let inner_scope_first = inner.mount(&root).unwrap();
    let outer_scope = outer.mount(&root).unwrap();
    let nested = outer_scope.nest(&inner);

    assert_eq!(nested.resolve(&def, None).unwrap().state.key(), "counter@inner");
    assert_eq!(outer_scope.resolve(&def, None).unwrap().state.key(), "counter@outer");
    assert_eq!(inner_scope_first.resolve(&def, None).unwrap().state.key(), "counter@inner");
}

#[test]
fn contained_store_outside_its_container_fails() {
    let runtime = Runtime::new();
    let form = ContainerKind::new("Form");
    let field = StoreDefinition::<Value>::builder(json!({"value": ""}))
        .named("field")
        .contained_by(&form)
        .build();

    let err = runtime.root_scope().resolve(&field, None).unwrap_err();
    assert!(matches!(err, StoreError::NotContained { .. }));
    assert_eq!(
        err.to_string(),
        "store 'field' must be contained by a 'Form' container"
    );

    let dynamic = canopy::DynamicContainer::new(&runtime, canopy::Matcher::Kind(form));
    let scope = dynamic.mount(&runtime.root_scope());
    assert!(scope.resolve(&field, None).is_ok());
}

#[test]
fn thunk_errors_reach_the_caller() {
    let runtime = manual_runtime();
    let def = StoreDefinition::<Counter>::builder(Counter { count: 0 })
        .action("fail", |_args: Value| {
            |api: &ActionApi<Counter>, _: &()| -> ActionResult {
                api.set_state(json!({"count": 1}))?;
                Err(anyhow::anyhow!("backend unavailable").into())
            }
        })
        .build();
    let store = runtime.registry().get_store(&def, None).unwrap();
    let err = store.actions.call("fail", Value::Null).unwrap_err();
    assert_eq!(err.to_string(), "backend unavailable");
    assert_eq!(store.state.get_state().count, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn async_thunks_return_their_future() {
    let runtime = Runtime::new();
    let store = runtime.root_scope().resolve(&counter(), None).unwrap();

    let pending = store.actions.run("load", |api, _| {
        let api = api.clone();
        async move {
            tokio::task::yield_now().await;
            api.set_state(json!({"count": 40}))
        }
    });
    assert_eq!(store.state.get_state().count, 0);
    pending.await.unwrap();
    assert_eq!(store.state.get_state().count, 40);
}

#[test]
fn scoped_runtime_is_isolated() {
    let def = counter();
    Runtime::scope(|| {
        let runtime = Runtime::current();
        runtime.registry().get_store(&def, None).unwrap();
        assert_eq!(runtime.registry().len(), 1);
    });
    Runtime::scope(|| {
        assert!(Runtime::current().registry().is_empty());
    });
}

proptest! {
    #[test]
    fn batched_adds_notify_once_with_the_sum(steps in prop::collection::vec(-50i64..50, 1..20)) {
        let runtime = manual_runtime();
        let store = runtime.registry().get_store(&counter(), None).unwrap();
        let (seen, _subscription) = record(&store);

        let mut expected = 0;
        for step in &steps {
            store.actions.call("add", json!(step)).unwrap();
            expected += step;
        }
        runtime.scheduler().flush();

        let seen = seen.lock();
        if steps.iter().all(|s| *s == 0) {
            prop_assert!(seen.is_empty());
        } else {
            prop_assert_eq!(&*seen, &vec![expected]);
        }
    }

    #[test]
    fn reset_restores_initial_state(values in prop::collection::vec(any::<i64>(), 0..10)) {
        let runtime = manual_runtime();
        let store = runtime.registry().get_store(&counter(), None).unwrap();
        for value in values {
            store.state.mutate(json!({"count": value})).unwrap();
        }
        store.state.reset_state();
        prop_assert_eq!(store.state.get_state().count, 0);
    }

    #[test]
    fn shallow_merge_keeps_untouched_keys(
        base in prop::collection::btree_map("[a-d]", any::<i32>(), 0..4),
        patch in prop::collection::btree_map("[c-f]", any::<i32>(), 0..4),
    ) {
        let merged = canopy::runtime::shallow_merge(
            "props",
            serde_json::to_value(&base).unwrap(),
            serde_json::to_value(&patch).unwrap(),
        )
        .unwrap();
        for (key, value) in &base {
            let expected = patch.get(key).unwrap_or(value);
            prop_assert_eq!(&merged[key.as_str()], &json!(expected));
        }
        for (key, value) in &patch {
            prop_assert_eq!(&merged[key.as_str()], &json!(value));
        }
    }
}
