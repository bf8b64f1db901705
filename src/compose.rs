//! Composing graphs into larger graphs.
//!
//! A whole [`Graph`] can be wrapped as a single [`Node`] with
//! [`GraphNode`], chained sequentially with [`chain`], or grouped for
//! concurrent execution with [`parallel_group`]. [`GraphBuilder`] offers a
//! name-based fluent alternative to wiring `Arc<Node>` handles by hand: it
//! records `(from, action, to)` triples, resolves them once every node is
//! registered, and reports the full list of unresolved references instead
//! of failing on the first.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::action::Action;
use crate::context::Context;
use crate::error::{BuildIssue, Error, Result};
use crate::graph::Graph;
use crate::node::{BackendResult, Node, NodeBackend};
use crate::store::{Store, StoreReader};
use crate::validate::validate_graph;
use crate::value::{Value, ValueKind};

/// Wrap a graph as a node.
///
/// The wrapper runs the inner graph as its Exec phase; the inner graph
/// keeps its own store. Two optional keys bridge the outer store:
///
/// - `input_key`: Prep reads the inner input from this key of the *outer*
///   store and ignores the value passed in (absence reads as null).
/// - `output_key`: Post writes the inner output to this key of the outer
///   store *and* returns it normally, so downstream nodes see it either
///   way.
pub struct GraphNode;

impl GraphNode {
    pub fn builder(name: impl Into<String>, graph: Graph) -> GraphNodeBuilder {
        GraphNodeBuilder {
            name: name.into(),
            graph,
            input_key: None,
            output_key: None,
            input_kind: ValueKind::Any,
            output_kind: ValueKind::Any,
        }
    }
}

/// Builder returned by [`GraphNode::builder`].
pub struct GraphNodeBuilder {
    name: String,
    graph: Graph,
    input_key: Option<String>,
    output_key: Option<String>,
    input_kind: ValueKind,
    output_kind: ValueKind,
}

impl GraphNodeBuilder {
    /// Read the inner input from this outer-store key instead of the passed
    /// input.
    pub fn input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = Some(key.into());
        self
    }

    /// Mirror the inner output to this outer-store key.
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn input(mut self, kind: ValueKind) -> Self {
        self.input_kind = kind;
        self
    }

    pub fn output(mut self, kind: ValueKind) -> Self {
        self.output_kind = kind;
        self
    }

    pub fn build(self) -> Arc<Node> {
        Node::builder(self.name)
            .input(self.input_kind)
            .output(self.output_kind)
            .backend(GraphBackend {
                graph: self.graph,
                input_key: self.input_key,
                output_key: self.output_key,
            })
            .build()
    }
}

struct GraphBackend {
    graph: Graph,
    input_key: Option<String>,
    output_key: Option<String>,
}

#[async_trait]
impl NodeBackend for GraphBackend {
    async fn prep(&self, _ctx: &Context, store: &StoreReader, input: Value) -> BackendResult<Value> {
        match &self.input_key {
            Some(key) => Ok(store.get(key).unwrap_or(Value::Null)),
            None => Ok(input),
        }
    }

    async fn exec(&self, ctx: &Context, prep_data: Value) -> BackendResult<Value> {
        Ok(self.graph.run(ctx, prep_data).await?)
    }

    async fn post(
        &self,
        ctx: &Context,
        store: &Store,
        _input: Value,
        _prep_data: Value,
        exec_result: Value,
    ) -> BackendResult<(Value, Action)> {
        if let Some(key) = &self.output_key {
            store.set(ctx, key.clone(), exec_result.clone())?;
        }
        Ok((exec_result, Action::default()))
    }
}

/// Connect the nodes sequentially with `default` edges and return the
/// first, or `None` for an empty slice.
pub fn chain(nodes: &[Arc<Node>]) -> Option<Arc<Node>> {
    for pair in nodes.windows(2) {
        pair[0].connect(Action::DEFAULT, Arc::clone(&pair[1]));
    }
    nodes.first().cloned()
}

/// A node that runs the given graphs concurrently on the same input and
/// outputs the list of their outputs, in declared order.
pub fn parallel_group(name: impl Into<String>, graphs: Vec<Graph>) -> Arc<Node> {
    Node::builder(name)
        .output(ValueKind::List)
        .backend(ParallelGroupBackend { graphs })
        .build()
}

struct ParallelGroupBackend {
    graphs: Vec<Graph>,
}

#[async_trait]
impl NodeBackend for ParallelGroupBackend {
    async fn exec(&self, ctx: &Context, prep_data: Value) -> BackendResult<Value> {
        let handles: Vec<_> = self
            .graphs
            .iter()
            .map(|graph| {
                let graph = graph.clone();
                let ctx = ctx.clone();
                let input = prep_data.clone();
                tokio::spawn(async move { graph.run(&ctx, input).await })
            })
            .collect();

        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => outputs.push(result?),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => return Err(Box::new(Error::Cancelled)),
            }
        }
        Ok(Value::List(outputs))
    }
}

/// Fluent, name-based graph construction.
///
/// Nodes are registered under their own names; edges reference names and
/// resolve at [`GraphBuilder::build`]. Unresolved references, duplicate
/// names, and a missing start node are collected into
/// [`Error::Build`] rather than reported one at a time. A successful build
/// also runs the connection validator.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<String, Arc<Node>>,
    edges: Vec<(String, String, String)>,
    start: Option<String>,
    store: Option<Store>,
    issues: Vec<BuildIssue>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under its own name.
    pub fn node(mut self, node: Arc<Node>) -> Self {
        let name = node.name().to_string();
        if self.nodes.insert(name.clone(), node).is_some() {
            self.issues.push(BuildIssue::DuplicateNode(name));
        }
        self
    }

    /// Record an edge by name; resolution happens at build.
    pub fn edge(
        mut self,
        from: impl Into<String>,
        action: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.edges.push((from.into(), action.into(), to.into()));
        self
    }

    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    /// The store for the built graph; defaults to an unbounded memory
    /// store.
    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Graph> {
        let GraphBuilder {
            nodes,
            edges,
            start,
            store,
            mut issues,
        } = self;

        for (from, action, to) in &edges {
            if !nodes.contains_key(from) {
                issues.push(BuildIssue::UnknownSource(from.clone()));
            }
            if !nodes.contains_key(to) {
                issues.push(BuildIssue::UnknownTarget {
                    from: from.clone(),
                    action: action.clone(),
                    to: to.clone(),
                });
            }
        }
        let start_name = match &start {
            None => {
                issues.push(BuildIssue::NoStart);
                None
            }
            Some(name) if !nodes.contains_key(name) => {
                issues.push(BuildIssue::UnknownStart(name.clone()));
                None
            }
            Some(name) => Some(name.clone()),
        };

        if !issues.is_empty() {
            return Err(Error::Build(issues));
        }

        // All references resolve; now it is safe to mutate successor maps.
        for (from, action, to) in edges {
            let target = Arc::clone(&nodes[&to]);
            nodes[&from].connect(action, target);
        }

        let start_node = Arc::clone(&nodes[&start_name.expect("checked above")]);
        validate_graph(&start_node)?;
        Ok(Graph::new(
            start_node,
            store.unwrap_or_else(Store::memory),
        ))
    }
}
