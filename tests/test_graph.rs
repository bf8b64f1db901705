use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use workgraph::prelude::*;

fn upper() -> Arc<Node> {
    Node::builder("upper")
        .input(ValueKind::String)
        .output(ValueKind::String)
        .exec(|_, v| async move {
            BackendResult::Ok(Value::from(v.as_str().unwrap_or_default().to_uppercase()))
        })
        .build()
}

#[tokio::test]
async fn single_node_graph() {
    let graph = Graph::new(upper(), Store::memory());
    graph.validate().unwrap();

    let output = graph
        .run(&Context::new(), Value::from("hello"))
        .await
        .unwrap();
    assert_eq!(output, Value::from("HELLO"));
}

#[tokio::test]
async fn two_node_pipeline_via_default_edge() {
    let append_excl = Node::builder("append_excl")
        .input(ValueKind::String)
        .output(ValueKind::String)
        .exec(|_, v| async move {
            BackendResult::Ok(Value::from(format!("{}!", v.as_str().unwrap_or_default())))
        })
        .build();

    let start = upper();
    start.connect(Action::DEFAULT, append_excl);
    let graph = Graph::new(start, Store::memory());
    graph.validate().unwrap();

    let output = graph.run(&Context::new(), Value::from("hi")).await.unwrap();
    assert_eq!(output, Value::from("HI!"));
}

#[tokio::test]
async fn conditional_routing_on_score() {
    let classify = Node::builder("classify")
        .input(ValueKind::Map)
        .post(|_, _, input, _, _| async move {
            let score = input
                .as_map()
                .and_then(|m| m.get("score"))
                .and_then(Value::as_float)
                .unwrap_or(0.0);
            let action = if score > 0.8 { "high" } else { "low" };
            Ok((input, Action::from(action)))
        })
        .build();

    let level = |name: &str| {
        let label = name.to_string();
        Node::builder(name)
            .output(ValueKind::Map)
            .exec(move |_, _| {
                let label = label.clone();
                async move {
                    let mut m = HashMap::new();
                    m.insert("level".to_string(), Value::from(label));
                    BackendResult::Ok(Value::Map(m))
                }
            })
            .build()
    };

    classify.connect("high", level("high"));
    classify.connect("low", level("low"));
    let graph = Graph::new(classify, Store::memory());
    graph.validate().unwrap();

    let mut input = HashMap::new();
    input.insert("score".to_string(), Value::from(0.9));
    let output = graph.run(&Context::new(), Value::Map(input)).await.unwrap();

    let level = output.as_map().and_then(|m| m.get("level")).cloned();
    assert_eq!(level, Some(Value::from("high")));
}

#[tokio::test]
async fn predecessor_completes_before_successor_preps() {
    let trace: Arc<Mutex<Vec<String>>> = Arc::default();

    let make = |name: &str, trace: Arc<Mutex<Vec<String>>>| {
        let (prep_name, done_name) = (name.to_string(), name.to_string());
        let (prep_trace, done_trace) = (trace.clone(), trace);
        Node::builder(name)
            .prep(move |_, _, input| {
                prep_trace.lock().push(format!("{prep_name}:prep"));
                async move { Ok(input) }
            })
            .on_complete(move |_, _| {
                done_trace.lock().push(format!("{done_name}:complete"));
                async move { Ok(()) }
            })
            .build()
    };

    let first = make("first", trace.clone());
    let second = make("second", trace.clone());
    first.connect(Action::DEFAULT, second);

    Graph::new(first, Store::memory())
        .run(&Context::new(), Value::Null)
        .await
        .unwrap();

    assert_eq!(
        trace.lock().as_slice(),
        [
            "first:prep",
            "first:complete",
            "second:prep",
            "second:complete"
        ]
    );
}

#[tokio::test]
async fn noop_node_is_the_identity_prefix() {
    let ctx = Context::new();
    let store = Store::memory();

    // Run the suffix on its own...
    let direct = Graph::new(upper(), store.clone())
        .run(&ctx, Value::from("abc"))
        .await
        .unwrap();

    // ...and behind a node with no phases and a single default successor.
    let noop = Node::builder("noop").build();
    noop.connect(Action::DEFAULT, upper());
    let prefixed = Graph::new(noop, store)
        .run(&ctx, Value::from("abc"))
        .await
        .unwrap();

    assert_eq!(direct, prefixed);
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let node = Node::builder("never")
        .prep(move |_, _, input| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok(input) }
        })
        .build();

    let ctx = Context::new();
    ctx.cancel();
    let err = Graph::new(node, Store::memory())
        .run(&ctx, Value::Null)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_mid_run_stops_the_traversal() {
    let downstream_calls = Arc::new(AtomicU32::new(0));

    let ctx = Context::new();
    let trigger = ctx.clone();
    let canceller = Node::builder("canceller")
        .post(move |_, _, _, _, exec| {
            trigger.cancel();
            async move { Ok((exec, Action::default())) }
        })
        .build();

    let seen = Arc::clone(&downstream_calls);
    let downstream = Node::builder("downstream")
        .exec(move |_, prep| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok(prep) }
        })
        .build();
    canceller.connect(Action::DEFAULT, downstream);

    let err = Graph::new(canceller, Store::memory())
        .run(&ctx, Value::Null)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bounded_cycles_terminate_through_node_logic() {
    let ctx = Context::new();
    let store = Store::memory();

    // An agent-style loop: count up in the store, exit after three laps.
    let looper = Node::builder("looper")
        .post(|ctx, store: Store, _, _, _| async move {
            let laps = store.get("laps").and_then(|v| v.as_int()).unwrap_or(0) + 1;
            store.set(&ctx, "laps", Value::from(laps))?;
            let action = if laps < 3 { "again" } else { "done" };
            Ok((Value::from(laps), Action::from(action)))
        })
        .build();
    looper.connect("again", Arc::clone(&looper));

    let output = Graph::new(looper, store).run(&ctx, Value::Null).await.unwrap();
    assert_eq!(output, Value::from(3i64));
}

#[tokio::test]
async fn run_input_type_mismatch_fails_fast() {
    let strict = Node::builder("strict").input(ValueKind::Map).build();
    let err = Graph::new(strict, Store::memory())
        .run(&Context::new(), Value::from(1i64))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }));
}
