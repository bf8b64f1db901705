//! Memoization of a node's Exec phase.
//!
//! [`wrap_cached`] produces a node whose Exec consults a cache store before
//! delegating to the wrapped node's backend. The cache is keyed by a
//! caller-supplied fingerprint of the prep data and is deliberately a
//! *separate* store from the workflow store: a cache hit must not observe
//! workflow state writes, and vice versa. Errors are never cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::action::Action;
use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::node::{BackendResult, Node, NodeBackend};
use crate::store::{Store, StoreReader};
use crate::value::Value;

/// Derives the cache key from the prep data.
pub type FingerprintFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Wrap `node` with a memoizing Exec phase.
///
/// On each lifecycle the wrapper computes `fingerprint(prep_data)`, returns
/// the cached value on a hit (the inner Exec never runs), and on a miss
/// runs the inner Exec and stores a successful result under `ttl`.
/// Typically `cache` is a bounded store so stale entries age out and the
/// cache stays within budget.
///
/// Prep, Post, fallback, and the hooks delegate to the wrapped node's
/// backend. The wrapper is a new node identity: it starts with the wrapped
/// node's name, kinds, and resilience policy but an empty successor map,
/// so connect its edges on the wrapper.
pub fn wrap_cached(
    node: &Arc<Node>,
    cache: Store,
    fingerprint: impl Fn(&Value) -> String + Send + Sync + 'static,
    ttl: Duration,
) -> Arc<Node> {
    Node::from_parts(
        node.name().to_string(),
        node.input_kind(),
        node.output_kind(),
        Box::new(CachedBackend {
            inner: Arc::clone(node),
            cache,
            fingerprint: Arc::new(fingerprint),
            ttl,
        }),
        node.retry_policy(),
        node.phase_timeouts(),
    )
}

struct CachedBackend {
    inner: Arc<Node>,
    cache: Store,
    fingerprint: FingerprintFn,
    ttl: Duration,
}

#[async_trait]
impl NodeBackend for CachedBackend {
    async fn prep(&self, ctx: &Context, store: &StoreReader, input: Value) -> BackendResult<Value> {
        self.inner.backend().prep(ctx, store, input).await
    }

    async fn exec(&self, ctx: &Context, prep_data: Value) -> BackendResult<Value> {
        let key = (self.fingerprint)(&prep_data);
        if let Some(hit) = self.cache.get(&key) {
            debug!(node = self.inner.name(), key = %key, "exec cache hit");
            return Ok(hit);
        }

        let result = self.inner.backend().exec(ctx, prep_data).await?;
        // A failed cache write must not discard a successful exec.
        if let Err(err) = self.cache.set_with_ttl(ctx, key, result.clone(), self.ttl) {
            warn!(node = self.inner.name(), error = %err, "cache write failed");
        }
        Ok(result)
    }

    async fn post(
        &self,
        ctx: &Context,
        store: &Store,
        input: Value,
        prep_data: Value,
        exec_result: Value,
    ) -> BackendResult<(Value, Action)> {
        self.inner
            .backend()
            .post(ctx, store, input, prep_data, exec_result)
            .await
    }

    async fn exec_fallback(
        &self,
        ctx: &Context,
        input: Value,
        error: BoxError,
    ) -> BackendResult<Value> {
        self.inner.backend().exec_fallback(ctx, input, error).await
    }

    fn has_fallback(&self) -> bool {
        self.inner.backend().has_fallback()
    }

    async fn on_success(&self, ctx: &Context, store: &Store, output: &Value) -> BackendResult<()> {
        self.inner.backend().on_success(ctx, store, output).await
    }

    async fn on_failure(&self, ctx: &Context, store: &Store, error: &Error) -> BackendResult<()> {
        self.inner.backend().on_failure(ctx, store, error).await
    }

    async fn on_complete(&self, ctx: &Context, store: &Store) -> BackendResult<()> {
        self.inner.backend().on_complete(ctx, store).await
    }
}
