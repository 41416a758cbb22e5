//! Counter store with batched notifications

use canopy::prelude::*;
use canopy::FlushMode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Counter {
    count: i64,
    label: String,
}

fn main() -> canopy::Result<()> {
    println!("=== Counter Example ===\n");

    let counter = StoreDefinition::builder(Counter {
        count: 0,
        label: "clicks".to_string(),
    })
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
            Ok(json!(api.get_state().count))
        }
    })
    .build();

    // The host loop flushes notifications itself
    let runtime = Runtime::new();
    runtime.scheduler().set_mode(FlushMode::Manual);

    println!("1. Resolving the counter store");
    let store = runtime.root_scope().resolve(&counter, None)?;
    println!("   key = {}", store.state.key());
    println!("   state = {:?}\n", store.state.get_state());

    println!("2. Subscribing");
    let _subscription = store.state.subscribe(|state| {
        println!("   -> notified: {} = {}", state.label, state.count);
    });

    println!("\n3. Calling increment three times in one tick");
    for _ in 0..3 {
        store.actions.call("increment", Value::Null)?;
    }
    println!("   pending notifications: {}", runtime.scheduler().pending());
    runtime.scheduler().flush();

    println!("\n4. Calling add(10)");
    let result = store.actions.call("add", json!(10))?;
    println!("   action returned {result}");
    runtime.scheduler().flush();

    println!("\n5. Resetting");
    store.state.reset_state();
    runtime.scheduler().flush();

    println!("\n✓ Example complete!");
    Ok(())
}
