//! Nodes: the units of work in a workflow graph.
//!
//! Every node runs a three-phase lifecycle:
//!
//! 1. **Prep** reads and validates context from the store. It receives the
//!    read-only [`StoreReader`] capability.
//! 2. **Exec** performs the computation. It has *no* store access: it must
//!    be a pure function of its arguments, which is what makes retry,
//!    caching, and fan-out safe.
//! 3. **Post** writes results back through the full [`Store`] handle and
//!    returns the output together with the [`Action`] selecting the
//!    outgoing edge.
//!
//! Omitted phases behave as identity: a missing Prep forwards the input, a
//! missing Exec forwards the prep data, a missing Post emits the exec
//! result under the `default` action.
//!
//! The engine applies the node's resilience policy around the phases: Exec
//! failures are retried with a fixed delay (Exec only, because only Exec is
//! pure), a fallback may absorb an exhausted retry loop, each phase may
//! carry its own timeout, and the success/failure/complete hooks observe
//! the outcome. `on_complete` runs on every exit path once the lifecycle
//! has been entered; treat it as the resource-release hook.
//!
//! Implement [`NodeBackend`] for stateful node types, or assemble nodes
//! from closures with [`Node::builder`]. Nodes are long-lived and may serve
//! many concurrent runs; per-run state belongs in the store, not in fields.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::action::Action;
use crate::context::Context;
use crate::error::{BoxError, Error, Phase, Result};
use crate::store::{Store, StoreReader};
use crate::value::{Value, ValueKind};

/// Result type at the phase-function boundary.
pub type BackendResult<T> = std::result::Result<T, BoxError>;

/// Behavior of a node. Every method has an identity/no-op default, so an
/// implementation overrides only the phases it needs.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Read-only preparation: validate and canonicalize the input, load
    /// context from the store. Defaults to forwarding the input.
    async fn prep(
        &self,
        _ctx: &Context,
        _store: &StoreReader,
        input: Value,
    ) -> BackendResult<Value> {
        Ok(input)
    }

    /// The computation. Must be a pure function of its arguments; it is the
    /// only phase subject to retry and caching. Defaults to forwarding the
    /// prep data.
    async fn exec(&self, _ctx: &Context, prep_data: Value) -> BackendResult<Value> {
        Ok(prep_data)
    }

    /// Write results, pick the outgoing edge. Defaults to emitting the exec
    /// result under [`Action::DEFAULT`].
    async fn post(
        &self,
        _ctx: &Context,
        _store: &Store,
        _input: Value,
        _prep_data: Value,
        exec_result: Value,
    ) -> BackendResult<(Value, Action)> {
        Ok((exec_result, Action::default()))
    }

    /// Invoked when Exec has failed on the initial attempt and every retry.
    /// The result feeds into Post as the exec result. The default re-raises.
    async fn exec_fallback(
        &self,
        _ctx: &Context,
        _input: Value,
        error: BoxError,
    ) -> BackendResult<Value> {
        Err(error)
    }

    /// Whether [`exec_fallback`](NodeBackend::exec_fallback) is a real
    /// fallback rather than the re-raising default. Distinguishes
    /// [`Error::RetriesExhausted`] from [`Error::FallbackFailed`].
    fn has_fallback(&self) -> bool {
        false
    }

    /// Observes a successful lifecycle. Hook errors are logged, never
    /// returned.
    async fn on_success(
        &self,
        _ctx: &Context,
        _store: &Store,
        _output: &Value,
    ) -> BackendResult<()> {
        Ok(())
    }

    /// Observes a failed lifecycle.
    async fn on_failure(&self, _ctx: &Context, _store: &Store, _error: &Error) -> BackendResult<()> {
        Ok(())
    }

    /// Runs after every lifecycle, whether it succeeded, failed, or was
    /// cancelled. This is the cleanup hook.
    async fn on_complete(&self, _ctx: &Context, _store: &Store) -> BackendResult<()> {
        Ok(())
    }
}

/// Exec retry policy: `max_retries` retries after the initial attempt, with
/// a fixed delay in between. Cancellation aborts the delay immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Optional per-phase deadlines. On expiry the phase's child context is
/// cancelled and the attempt fails with [`Error::Timeout`]; an Exec timeout
/// is retryable like any other Exec failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimeouts {
    pub prep: Option<Duration>,
    pub exec: Option<Duration>,
    pub post: Option<Duration>,
}

/// A named unit of work with declared input/output types, a backend, a
/// successor map, and a resilience policy.
///
/// Input and output kinds are fixed at construction. The successor map is
/// the only mutable part; runs read it through a consistent snapshot.
pub struct Node {
    name: String,
    input_kind: ValueKind,
    output_kind: ValueKind,
    backend: Box<dyn NodeBackend>,
    retry: RetryPolicy,
    timeouts: PhaseTimeouts,
    successors: RwLock<HashMap<String, Arc<Node>>>,
}

impl Node {
    /// Start building a node. Input and output kinds default to
    /// [`ValueKind::Any`].
    pub fn builder(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        input_kind: ValueKind,
        output_kind: ValueKind,
        backend: Box<dyn NodeBackend>,
        retry: RetryPolicy,
        timeouts: PhaseTimeouts,
    ) -> Arc<Node> {
        Arc::new(Node {
            name,
            input_kind,
            output_kind,
            backend,
            retry,
            timeouts,
            successors: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_kind(&self) -> ValueKind {
        self.input_kind
    }

    pub fn output_kind(&self) -> ValueKind {
        self.output_kind
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn phase_timeouts(&self) -> PhaseTimeouts {
        self.timeouts
    }

    pub(crate) fn backend(&self) -> &dyn NodeBackend {
        self.backend.as_ref()
    }

    /// Record `action -> next` in the successor map, replacing any prior
    /// binding for the same action.
    pub fn connect(&self, action: impl Into<Action>, next: Arc<Node>) {
        let action = action.into();
        assert!(!action.name().is_empty(), "actions must be non-empty");
        self.successors
            .write()
            .insert(action.name().to_string(), next);
    }

    /// The successor for an action, if any.
    pub fn successor(&self, action: &str) -> Option<Arc<Node>> {
        self.successors.read().get(action).cloned()
    }

    /// A consistent snapshot of the successor map.
    pub fn successors(&self) -> HashMap<String, Arc<Node>> {
        self.successors.read().clone()
    }

    /// Drive one lifecycle of this node under its resilience policy.
    ///
    /// Checks cancellation and the declared input kind, runs
    /// Prep → Exec (with retries, fallback) → Post, then fires the hooks.
    /// Returns the output value and the action chosen by Post.
    pub async fn run(&self, ctx: &Context, store: &Store, input: Value) -> Result<(Value, Action)> {
        ctx.check()?;
        let actual = input.kind();
        if !actual.assignable_to(self.input_kind) {
            return Err(Error::InvalidInput {
                node: self.name.clone(),
                expected: self.input_kind,
                actual,
            });
        }

        trace!(node = %self.name, execution = %ctx.execution_id(), "lifecycle entered");
        let result = self.lifecycle(ctx, store, input).await;

        match &result {
            Ok((output, action)) => {
                if let Err(err) = self.backend.on_success(ctx, store, output).await {
                    warn!(node = %self.name, error = %err, "on_success hook failed");
                }
                trace!(node = %self.name, action = %action, "lifecycle finished");
            }
            Err(error) => {
                if let Err(err) = self.backend.on_failure(ctx, store, error).await {
                    warn!(node = %self.name, error = %err, "on_failure hook failed");
                }
            }
        }
        // The cleanup hook runs on every exit path after lifecycle entry.
        if let Err(err) = self.backend.on_complete(ctx, store).await {
            warn!(node = %self.name, error = %err, "on_complete hook failed");
        }

        result
    }

    async fn lifecycle(
        &self,
        ctx: &Context,
        store: &Store,
        input: Value,
    ) -> Result<(Value, Action)> {
        let backend = self.backend.as_ref();

        let reader = store.reader();
        let prep_input = input.clone();
        let prep_data = run_phase(ctx, self.timeouts.prep, move |c| async move {
            backend.prep(&c, &reader, prep_input).await
        })
        .await
        .map_err(|e| e.into_error(&self.name, Phase::Prep))?;

        let mut attempt: u32 = 0;
        let exec_result = loop {
            let attempt_data = prep_data.clone();
            let outcome = run_phase(ctx, self.timeouts.exec, move |c| async move {
                backend.exec(&c, attempt_data).await
            })
            .await;

            match outcome {
                Ok(value) => break value,
                Err(AttemptError::Cancelled) => return Err(Error::Cancelled),
                Err(failure) => {
                    if attempt < self.retry.max_retries {
                        attempt += 1;
                        debug!(node = %self.name, attempt, "exec failed, retrying");
                        if !self.retry.retry_delay.is_zero() {
                            tokio::select! {
                                _ = tokio::time::sleep(self.retry.retry_delay) => {}
                                _ = ctx.cancelled() => return Err(Error::Cancelled),
                            }
                        }
                        continue;
                    }

                    if backend.has_fallback() {
                        let cause = failure.into_box(&self.name);
                        let fallback_input = input.clone();
                        let fallback = run_phase(ctx, None, move |c| async move {
                            backend.exec_fallback(&c, fallback_input, cause).await
                        })
                        .await;
                        match fallback {
                            Ok(value) => break value,
                            Err(AttemptError::Cancelled) => return Err(Error::Cancelled),
                            Err(err) => {
                                return Err(Error::FallbackFailed {
                                    node: self.name.clone(),
                                    source: err.into_box(&self.name),
                                });
                            }
                        }
                    } else if self.retry.max_retries == 0 {
                        return Err(failure.into_error(&self.name, Phase::Exec));
                    } else {
                        return Err(Error::RetriesExhausted {
                            node: self.name.clone(),
                            attempts: attempt + 1,
                            source: failure.into_box(&self.name),
                        });
                    }
                }
            }
        };

        let post_store = store.clone();
        let (output, action) = run_phase(ctx, self.timeouts.post, move |c| async move {
            backend
                .post(&c, &post_store, input, prep_data, exec_result)
                .await
        })
        .await
        .map_err(|e| e.into_error(&self.name, Phase::Post))?;

        Ok((output, action))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("input", &self.input_kind)
            .field("output", &self.output_kind)
            .field("successors", &self.successors.read().len())
            .finish()
    }
}

/// How a single phase attempt ended short of success.
enum AttemptError {
    Failed(BoxError),
    Timeout(Duration),
    Cancelled,
}

impl AttemptError {
    fn into_error(self, node: &str, phase: Phase) -> Error {
        match self {
            AttemptError::Failed(source) => Error::PhaseFailed {
                node: node.to_string(),
                phase,
                source,
            },
            AttemptError::Timeout(limit) => Error::Timeout {
                node: node.to_string(),
                phase,
                limit,
            },
            AttemptError::Cancelled => Error::Cancelled,
        }
    }

    fn into_box(self, node: &str) -> BoxError {
        match self {
            AttemptError::Failed(source) => source,
            AttemptError::Timeout(limit) => Box::new(Error::Timeout {
                node: node.to_string(),
                phase: Phase::Exec,
                limit,
            }),
            AttemptError::Cancelled => Box::new(Error::Cancelled),
        }
    }
}

/// Drive one phase attempt under its deadline, watching the run context.
/// The phase receives a child context; on deadline or run cancellation the
/// child is cancelled so work the phase spawned stops as well.
async fn run_phase<T, F, Fut>(
    ctx: &Context,
    limit: Option<Duration>,
    f: F,
) -> std::result::Result<T, AttemptError>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    if ctx.is_cancelled() {
        return Err(AttemptError::Cancelled);
    }
    let phase_ctx = ctx.child();
    let fut = f(phase_ctx.clone());

    match limit {
        None => {
            tokio::select! {
                result = fut => result.map_err(AttemptError::Failed),
                _ = ctx.cancelled() => {
                    phase_ctx.cancel();
                    Err(AttemptError::Cancelled)
                }
            }
        }
        Some(limit) => {
            tokio::select! {
                result = fut => result.map_err(AttemptError::Failed),
                _ = ctx.cancelled() => {
                    phase_ctx.cancel();
                    Err(AttemptError::Cancelled)
                }
                _ = tokio::time::sleep(limit) => {
                    phase_ctx.cancel();
                    Err(AttemptError::Timeout(limit))
                }
            }
        }
    }
}

// Boxed phase functions stored by the builder.
type PrepFn = Box<
    dyn Fn(Context, StoreReader, Value) -> BoxFuture<'static, BackendResult<Value>> + Send + Sync,
>;
type ExecFn = Box<dyn Fn(Context, Value) -> BoxFuture<'static, BackendResult<Value>> + Send + Sync>;
type PostFn = Box<
    dyn Fn(Context, Store, Value, Value, Value) -> BoxFuture<'static, BackendResult<(Value, Action)>>
        + Send
        + Sync,
>;
type FallbackFn =
    Box<dyn Fn(Context, Value, BoxError) -> BoxFuture<'static, BackendResult<Value>> + Send + Sync>;
type SuccessHook =
    Box<dyn Fn(Context, Store, Value) -> BoxFuture<'static, BackendResult<()>> + Send + Sync>;
type FailureHook =
    Box<dyn Fn(Context, Store, String) -> BoxFuture<'static, BackendResult<()>> + Send + Sync>;
type CompleteHook =
    Box<dyn Fn(Context, Store) -> BoxFuture<'static, BackendResult<()>> + Send + Sync>;

/// Closure-backed [`NodeBackend`] assembled by [`NodeBuilder`].
#[derive(Default)]
struct FunctionBackend {
    prep: Option<PrepFn>,
    exec: Option<ExecFn>,
    post: Option<PostFn>,
    fallback: Option<FallbackFn>,
    success: Option<SuccessHook>,
    failure: Option<FailureHook>,
    complete: Option<CompleteHook>,
}

#[async_trait]
impl NodeBackend for FunctionBackend {
    async fn prep(&self, ctx: &Context, store: &StoreReader, input: Value) -> BackendResult<Value> {
        match &self.prep {
            Some(f) => f(ctx.clone(), store.clone(), input).await,
            None => Ok(input),
        }
    }

    async fn exec(&self, ctx: &Context, prep_data: Value) -> BackendResult<Value> {
        match &self.exec {
            Some(f) => f(ctx.clone(), prep_data).await,
            None => Ok(prep_data),
        }
    }

    async fn post(
        &self,
        ctx: &Context,
        store: &Store,
        input: Value,
        prep_data: Value,
        exec_result: Value,
    ) -> BackendResult<(Value, Action)> {
        match &self.post {
            Some(f) => f(ctx.clone(), store.clone(), input, prep_data, exec_result).await,
            None => Ok((exec_result, Action::default())),
        }
    }

    async fn exec_fallback(
        &self,
        ctx: &Context,
        input: Value,
        error: BoxError,
    ) -> BackendResult<Value> {
        match &self.fallback {
            Some(f) => f(ctx.clone(), input, error).await,
            None => Err(error),
        }
    }

    fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    async fn on_success(&self, ctx: &Context, store: &Store, output: &Value) -> BackendResult<()> {
        match &self.success {
            Some(f) => f(ctx.clone(), store.clone(), output.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_failure(&self, ctx: &Context, store: &Store, error: &Error) -> BackendResult<()> {
        match &self.failure {
            Some(f) => f(ctx.clone(), store.clone(), error.to_string()).await,
            None => Ok(()),
        }
    }

    async fn on_complete(&self, ctx: &Context, store: &Store) -> BackendResult<()> {
        match &self.complete {
            Some(f) => f(ctx.clone(), store.clone()).await,
            None => Ok(()),
        }
    }
}

/// Fluent construction of a [`Node`].
///
/// Phases are closures; a custom [`NodeBackend`] set through
/// [`NodeBuilder::backend`] takes precedence over any closures.
pub struct NodeBuilder {
    name: String,
    input_kind: ValueKind,
    output_kind: ValueKind,
    retry: RetryPolicy,
    timeouts: PhaseTimeouts,
    custom: Option<Box<dyn NodeBackend>>,
    functions: FunctionBackend,
}

impl NodeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        NodeBuilder {
            name: name.into(),
            input_kind: ValueKind::Any,
            output_kind: ValueKind::Any,
            retry: RetryPolicy::default(),
            timeouts: PhaseTimeouts::default(),
            custom: None,
            functions: FunctionBackend::default(),
        }
    }

    pub fn input(mut self, kind: ValueKind) -> Self {
        self.input_kind = kind;
        self
    }

    pub fn output(mut self, kind: ValueKind) -> Self {
        self.output_kind = kind;
        self
    }

    pub fn prep<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, StoreReader, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<Value>> + Send + 'static,
    {
        self.functions.prep = Some(Box::new(move |ctx, store, input| {
            Box::pin(f(ctx, store, input))
        }));
        self
    }

    pub fn exec<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<Value>> + Send + 'static,
    {
        self.functions.exec = Some(Box::new(move |ctx, prep_data| Box::pin(f(ctx, prep_data))));
        self
    }

    pub fn post<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Store, Value, Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<(Value, Action)>> + Send + 'static,
    {
        self.functions.post = Some(Box::new(move |ctx, store, input, prep, exec| {
            Box::pin(f(ctx, store, input, prep, exec))
        }));
        self
    }

    pub fn fallback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Value, BoxError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<Value>> + Send + 'static,
    {
        self.functions.fallback = Some(Box::new(move |ctx, input, error| {
            Box::pin(f(ctx, input, error))
        }));
        self
    }

    pub fn on_success<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Store, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<()>> + Send + 'static,
    {
        self.functions.success = Some(Box::new(move |ctx, store, output| {
            Box::pin(f(ctx, store, output))
        }));
        self
    }

    /// The failure hook receives the rendered lifecycle error.
    pub fn on_failure<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Store, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<()>> + Send + 'static,
    {
        self.functions.failure = Some(Box::new(move |ctx, store, error| {
            Box::pin(f(ctx, store, error))
        }));
        self
    }

    pub fn on_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Store) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<()>> + Send + 'static,
    {
        self.functions.complete = Some(Box::new(move |ctx, store| Box::pin(f(ctx, store))));
        self
    }

    /// Number of retries after the initial Exec attempt.
    pub fn retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.retry_delay = delay;
        self
    }

    pub fn prep_timeout(mut self, limit: Duration) -> Self {
        self.timeouts.prep = Some(limit);
        self
    }

    pub fn exec_timeout(mut self, limit: Duration) -> Self {
        self.timeouts.exec = Some(limit);
        self
    }

    pub fn post_timeout(mut self, limit: Duration) -> Self {
        self.timeouts.post = Some(limit);
        self
    }

    /// Use a custom backend instead of closures. Any closures configured on
    /// this builder are ignored.
    pub fn backend(mut self, backend: impl NodeBackend + 'static) -> Self {
        self.custom = Some(Box::new(backend));
        self
    }

    pub fn build(self) -> Arc<Node> {
        let NodeBuilder {
            name,
            input_kind,
            output_kind,
            retry,
            timeouts,
            custom,
            functions,
        } = self;
        let backend = custom.unwrap_or_else(|| Box::new(functions));
        Node::from_parts(name, input_kind, output_kind, backend, retry, timeouts)
    }
}
