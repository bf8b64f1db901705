//! # workgraph
//!
//! A graph execution engine for declarative workflows.
//!
//! Workflows are directed graphs of named [`Node`]s connected by string
//! [`Action`]s. Each node runs a disciplined three-phase lifecycle,
//! **Prep** (read-only store access) → **Exec** (pure computation) →
//! **Post** (store writes + edge selection), and carries its own
//! resilience policy: retries, per-phase timeouts, a fallback, and
//! lifecycle hooks. State is shared through a [`Store`]: thread-safe,
//! prefix-scoped, and optionally bounded with LRU eviction and TTL.
//!
//! - [`Graph`] drives a run from a start node, routing on the action each
//!   Post returns, until no successor matches.
//! - [`validate_graph`] checks every reachable edge for type compatibility
//!   before the first run.
//! - [`concurrent`] provides fan-out, fan-in, pipeline, and parallel
//!   primitives over single-node runs.
//! - [`compose`] wraps graphs as nodes and offers a name-based fluent
//!   builder.
//! - [`wrap_cached`] memoizes a node's Exec phase in a separate cache
//!   store.
//!
//! ## Example
//!
//! ```rust
//! use workgraph::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> workgraph::Result<()> {
//! let upper = Node::builder("upper")
//!     .input(ValueKind::String)
//!     .output(ValueKind::String)
//!     .exec(|_ctx, v| async move {
//!         Ok(Value::from(v.as_str().unwrap_or_default().to_uppercase()))
//!     })
//!     .build();
//!
//! let graph = Graph::new(upper, Store::memory());
//! graph.validate()?;
//! let output = graph.run(&Context::new(), Value::from("hello")).await?;
//! assert_eq!(output, Value::from("HELLO"));
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod cache;
pub mod compose;
pub mod concurrent;
pub mod context;
pub mod error;
pub mod graph;
pub mod node;
pub mod store;
pub mod validate;
pub mod value;

pub use action::Action;
pub use cache::{FingerprintFn, wrap_cached};
pub use compose::{GraphBuilder, GraphNode, GraphNodeBuilder, chain, parallel_group};
pub use concurrent::{
    ErrorMode, ParallelConfig, fan_in, fan_out, fan_out_fail_fast, pipeline, run_concurrent,
    run_parallel,
};
pub use context::Context;
pub use error::{BoxError, BuildIssue, Error, Phase, Result};
pub use graph::Graph;
pub use node::{BackendResult, Node, NodeBackend, NodeBuilder, PhaseTimeouts, RetryPolicy};
pub use store::{
    BoundedConfig, EvictionCallback, MemoryBackend, StorageBackend, Store, StoreReader,
    StoreStats, TypedStore,
};
pub use validate::validate_graph;
pub use value::{Value, ValueKind};

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::action::Action;
    pub use crate::cache::wrap_cached;
    pub use crate::compose::{GraphBuilder, GraphNode, chain, parallel_group};
    pub use crate::concurrent::{
        ErrorMode, ParallelConfig, fan_in, fan_out, fan_out_fail_fast, pipeline, run_concurrent,
        run_parallel,
    };
    pub use crate::context::Context;
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::graph::Graph;
    pub use crate::node::{BackendResult, Node, NodeBackend, NodeBuilder};
    pub use crate::store::{BoundedConfig, Store, StoreReader, TypedStore};
    pub use crate::validate::validate_graph;
    pub use crate::value::{Value, ValueKind};
}
