//! Todo lists scoped by containers, with a memoized progress selector

use canopy::prelude::*;
use canopy::{FlushMode, StoreSubscriber};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    title: String,
    done: bool,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Todos {
    owner: String,
    items: Vec<Todo>,
}

#[derive(Debug, Clone, Default)]
struct Owner {
    name: String,
}

fn main() -> canopy::Result<()> {
    println!("=== Scoped Todos Example ===\n");

    let todos = StoreDefinition::<Todos, Owner>::builder(Todos {
        owner: String::new(),
        items: Vec::new(),
    })
    .named("todos")
    .action("add", |args: Value| {
        move |api: &ActionApi<Todos, Owner>, _: &Owner| -> ActionResult {
            let mut items = api.get_state().items.clone();
            items.push(Todo {
                title: args.as_str().unwrap_or_default().to_string(),
                done: false,
            });
            api.set_state(json!({ "items": items }))?;
            Ok(Value::Null)
        }
    })
    .action("toggle", |args: Value| {
        move |api: &ActionApi<Todos, Owner>, _: &Owner| -> ActionResult {
            let index = args.as_u64().unwrap_or(0) as usize;
            let mut items = api.get_state().items.clone();
            if let Some(item) = items.get_mut(index) {
                item.done = !item.done;
            }
            api.set_state(json!({ "items": items }))?;
            Ok(Value::Null)
        }
    })
    .build();

    let runtime = Runtime::new();
    runtime.scheduler().set_mode(FlushMode::Manual);
    let root = runtime.root_scope();

    println!("1. Mounting one container per user");
    let mut scopes = Vec::new();
    for name in ["ada", "grace"] {
        let container = Container::builder(&todos)
            .scope(name)
            .props(Owner {
                name: name.to_string(),
            })
            .on_init(|api, owner| {
                api.set_state(json!({ "owner": owner.name }))?;
                Ok(Value::Null)
            })
            .build(&runtime);
        let scope = container.mount(&root)?;
        println!("   mounted {}", scope.resolve(&todos, None)?.state.key());
        scopes.push((container, scope));
    }

    println!("\n2. Subscribing to ada's progress");
    let ada = scopes[0].1.resolve(&todos, None)?;
    let done = create_memoized_selector(|s: &Todos, _: &()| s.items.iter().filter(|t| t.done).count());
    let total = create_memoized_selector(|s: &Todos, _: &()| s.items.len());
    let progress = create_selector((done, total), |done: &usize, total: &usize| {
        format!("{done}/{total} done")
    });
    let subscriber = StoreSubscriber::new(ada.clone(), progress, (), |progress| {
        println!("   -> ada: {progress}");
    });
    println!("   initial: {}", subscriber.current());

    println!("\n3. Editing ada's list");
    ada.actions.call("add", json!("write docs"))?;
    ada.actions.call("add", json!("ship"))?;
    runtime.scheduler().flush();
    ada.actions.call("toggle", json!(0))?;
    runtime.scheduler().flush();

    println!("\n4. Grace's list is untouched");
    let grace = scopes[1].1.resolve(&todos, None)?;
    println!("   grace: {:?}", grace.state.get_state());

    println!("\n5. Tearing down");
    drop(subscriber);
    for (container, _) in &scopes {
        println!("   {:?} deleted: {}", container.scope_id(), container.teardown()?);
    }

    println!("\n✓ Example complete!");
    Ok(())
}
