//! The graph runner.
//!
//! A [`Graph`] pairs a start node with a store. A run drives one node's
//! lifecycle, looks the Post-returned action up in that node's successor
//! snapshot, feeds the output forward as the next node's input, and stops
//! when no successor matches. A single run is sequential across nodes: the
//! predecessor's `on_complete` fires before the successor's Prep begins.
//!
//! There is no built-in step limit. Cycles are permitted (an agent loop
//! that eventually returns a terminal action is a legal graph), but the
//! runner relies on node logic to bound them.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::Context;
use crate::error::Result;
use crate::node::Node;
use crate::store::Store;
use crate::validate::validate_graph;
use crate::value::Value;

/// A runnable workflow: a start node plus the store shared by the run.
///
/// A run constructs no other persistent state; everything lives in the
/// store and in whatever state nodes capture themselves.
#[derive(Clone)]
pub struct Graph {
    start: Arc<Node>,
    store: Store,
}

impl Graph {
    pub fn new(start: Arc<Node>, store: Store) -> Self {
        Graph { start, store }
    }

    pub fn start(&self) -> &Arc<Node> {
        &self.start
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Check every reachable edge for type compatibility. Intended to be
    /// called once after construction, before the first run.
    pub fn validate(&self) -> Result<()> {
        validate_graph(&self.start)
    }

    /// Execute the graph from its start node.
    ///
    /// Returns the output of the last node executed, or the first error.
    /// On failure, nodes before the failing one have already run their Post
    /// phases; callers must assume partial store effects.
    pub async fn run(&self, ctx: &Context, input: Value) -> Result<Value> {
        let mut current = Arc::clone(&self.start);
        let mut input = input;

        debug!(
            execution = %ctx.execution_id(),
            start = current.name(),
            "run started"
        );

        loop {
            ctx.check()?;
            let (output, action) = current.run(ctx, &self.store, input).await?;

            match current.successor(action.name()) {
                Some(next) => {
                    trace!(
                        from = current.name(),
                        action = %action,
                        to = next.name(),
                        "advancing"
                    );
                    input = output;
                    current = next;
                }
                None => {
                    debug!(
                        execution = %ctx.execution_id(),
                        last = current.name(),
                        action = %action,
                        "run finished"
                    );
                    return Ok(output);
                }
            }
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("start", &self.start.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BackendResult;
    use crate::value::ValueKind;

    fn upper() -> Arc<Node> {
        Node::builder("upper")
            .input(ValueKind::String)
            .output(ValueKind::String)
            .exec(|_, v| async move {
                let s = v.as_str().unwrap_or_default().to_uppercase();
                BackendResult::Ok(Value::from(s))
            })
            .build()
    }

    #[tokio::test]
    async fn single_node_run() {
        let graph = Graph::new(upper(), Store::memory());
        let output = graph
            .run(&Context::new(), Value::from("hello"))
            .await
            .unwrap();
        assert_eq!(output, Value::from("HELLO"));
    }

    #[tokio::test]
    async fn output_feeds_the_next_node() {
        let excl = Node::builder("excl")
            .input(ValueKind::String)
            .output(ValueKind::String)
            .exec(|_, v| async move {
                BackendResult::Ok(Value::from(format!("{}!", v.as_str().unwrap_or_default())))
            })
            .build();
        let start = upper();
        start.connect(crate::Action::DEFAULT, excl);

        let graph = Graph::new(start, Store::memory());
        let output = graph.run(&Context::new(), Value::from("hi")).await.unwrap();
        assert_eq!(output, Value::from("HI!"));
    }

    #[tokio::test]
    async fn unmatched_action_terminates() {
        let start = upper();
        // Successor exists, but under a different action.
        start.connect("elsewhere", upper());

        let graph = Graph::new(start, Store::memory());
        let output = graph.run(&Context::new(), Value::from("hi")).await.unwrap();
        assert_eq!(output, Value::from("HI"));
    }
}
