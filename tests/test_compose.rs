use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use workgraph::prelude::*;

fn adder(name: &str, amount: i64) -> Arc<Node> {
    Node::builder(name)
        .input(ValueKind::Int)
        .output(ValueKind::Int)
        .exec(move |_, v| async move {
            BackendResult::Ok(Value::from(v.as_int().unwrap_or(0) + amount))
        })
        .build()
}

#[tokio::test]
async fn graph_wrapped_as_node_composes() {
    // Inner graph: +1 then +10, with its own store.
    let inner_start = chain(&[adder("plus-one", 1), adder("plus-ten", 10)]).unwrap();
    let inner = Graph::new(inner_start, Store::memory());

    let wrapped = GraphNode::builder("inner-sum", inner)
        .input(ValueKind::Int)
        .output(ValueKind::Int)
        .build();
    wrapped.connect(Action::DEFAULT, adder("plus-hundred", 100));

    let outer = Graph::new(wrapped, Store::memory());
    outer.validate().unwrap();
    let output = outer.run(&Context::new(), Value::from(5i64)).await.unwrap();
    assert_eq!(output, Value::from(116i64));
}

#[tokio::test]
async fn input_key_replaces_and_output_key_mirrors() {
    let ctx = Context::new();
    let inner = Graph::new(adder("plus-one", 1), Store::memory());
    let wrapped = GraphNode::builder("plumbed", inner)
        .input_key("seed")
        .output_key("result")
        .build();

    let outer_store = Store::memory();
    outer_store.set(&ctx, "seed", Value::from(41i64)).unwrap();

    let graph = Graph::new(wrapped, outer_store.clone());
    // The passed input is ignored in favor of the configured input key.
    let output = graph.run(&ctx, Value::from(999i64)).await.unwrap();

    assert_eq!(output, Value::from(42i64), "output still flows normally");
    assert_eq!(outer_store.get("result"), Some(Value::from(42i64)));
}

#[tokio::test]
async fn parallel_group_collects_branch_outputs_in_order() {
    let slow_branch = Node::builder("slow")
        .exec(|_, v| async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            BackendResult::Ok(Value::from(v.as_int().unwrap_or(0) * 2))
        })
        .build();
    let graphs = vec![
        Graph::new(slow_branch, Store::memory()),
        Graph::new(adder("fast", 1), Store::memory()),
    ];

    let group = parallel_group("both", graphs);
    let output = Graph::new(group, Store::memory())
        .run(&Context::new(), Value::from(10i64))
        .await
        .unwrap();

    assert_eq!(
        output,
        Value::List(vec![Value::from(20i64), Value::from(11i64)])
    );
}

#[tokio::test]
async fn fluent_builder_resolves_names_and_validates() {
    let graph = GraphBuilder::new()
        .node(adder("first", 1))
        .node(adder("second", 2))
        .node(adder("third", 4))
        .edge("first", "default", "second")
        .edge("second", "default", "third")
        .start("first")
        .build()
        .unwrap();

    let output = graph.run(&Context::new(), Value::from(0i64)).await.unwrap();
    assert_eq!(output, Value::from(7i64));
}

#[tokio::test]
async fn fluent_builder_rejects_incompatible_edges() {
    let text = Node::builder("text")
        .input(ValueKind::String)
        .output(ValueKind::String)
        .build();
    let number = Node::builder("number")
        .input(ValueKind::Int)
        .output(ValueKind::Int)
        .build();

    let err = GraphBuilder::new()
        .node(text)
        .node(number)
        .edge("text", "default", "number")
        .start("text")
        .build()
        .unwrap_err();

    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[tokio::test]
async fn cached_wrapper_runs_inside_a_graph() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let expensive = Node::builder("expensive")
        .input(ValueKind::Int)
        .output(ValueKind::Int)
        .exec(move |_, v| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Value::from(v.as_int().unwrap_or(0) * 3)) }
        })
        .build();

    let cache = Store::bounded(BoundedConfig::new(32));
    let cached = wrap_cached(
        &expensive,
        cache,
        |prep| format!("{prep:?}"),
        Duration::from_secs(300),
    );
    cached.connect(Action::DEFAULT, adder("after", 1));

    let graph = Graph::new(cached, Store::memory());
    graph.validate().unwrap();

    let ctx = Context::new();
    assert_eq!(
        graph.run(&ctx, Value::from(7i64)).await.unwrap(),
        Value::from(22i64)
    );
    assert_eq!(
        graph.run(&ctx, Value::from(7i64)).await.unwrap(),
        Value::from(22i64)
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second run hits the cache");
}
