//! Structured concurrency over single-node runs.
//!
//! Each primitive drives ad-hoc lifecycles (`Node::run`) of individual
//! nodes against a shared store and preserves input-order → result-order
//! correspondence: wall-clock completion order is never observable through
//! the results. Siblings run as real tasks; in-flight work is bounded by a
//! semaphore where a concurrency cap applies, rather than spawning a task
//! per input and letting the scheduler sort it out.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::store::Store;
use crate::value::Value;

/// Error semantics for [`run_parallel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Cancel the remaining siblings on the first failure and return that
    /// error.
    #[default]
    FailFast,
    /// Let every task finish and report all failures together as
    /// [`Error::Aggregate`].
    Continue,
}

/// Options for [`run_parallel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelConfig {
    /// Upper bound on concurrently executing tasks. `None` runs everything
    /// at once.
    pub max_concurrency: Option<usize>,
    pub error_mode: ErrorMode,
}

/// Run one node over many inputs, at most `concurrency` at a time.
///
/// Results come back in input order. All siblings run to completion even
/// when one fails; the first failing slot's error is returned. Use
/// [`fan_out_fail_fast`] to cancel siblings on the first failure instead.
pub async fn fan_out(
    ctx: &Context,
    node: &Arc<Node>,
    store: &Store,
    inputs: Vec<Value>,
    concurrency: usize,
) -> Result<Vec<Value>> {
    fan_out_inner(ctx, node, store, inputs, concurrency, ErrorMode::Continue).await
}

/// [`fan_out`] in fail-fast mode: the first failure cancels the in-flight
/// siblings (through a shared child context) and is returned.
pub async fn fan_out_fail_fast(
    ctx: &Context,
    node: &Arc<Node>,
    store: &Store,
    inputs: Vec<Value>,
    concurrency: usize,
) -> Result<Vec<Value>> {
    fan_out_inner(ctx, node, store, inputs, concurrency, ErrorMode::FailFast).await
}

async fn fan_out_inner(
    ctx: &Context,
    node: &Arc<Node>,
    store: &Store,
    inputs: Vec<Value>,
    concurrency: usize,
    error_mode: ErrorMode,
) -> Result<Vec<Value>> {
    let tasks: Vec<_> = inputs
        .into_iter()
        .map(|input| (Arc::clone(node), input))
        .collect();
    let config = ParallelConfig {
        max_concurrency: Some(concurrency),
        error_mode,
    };
    match run_parallel(ctx, tasks, store, config).await {
        // Fan-out reports the first failing slot, not the collected list.
        Err(Error::Aggregate(mut failures)) if !failures.is_empty() => {
            Err(failures.swap_remove(0).1)
        }
        other => other,
    }
}

/// Run each `(node, input)` pair in parallel and pass the outputs, in
/// declared order, to the aggregator as a [`Value::List`].
pub async fn fan_in(
    ctx: &Context,
    sources: Vec<(Arc<Node>, Value)>,
    aggregator: &Arc<Node>,
    store: &Store,
) -> Result<Value> {
    let outputs = run_concurrent(ctx, sources, store).await?;
    let (output, _action) = aggregator.run(ctx, store, Value::List(outputs)).await?;
    Ok(output)
}

/// Feed `input` through the nodes in order; stage `i`'s output is stage
/// `i + 1`'s input. The first failing stage terminates the pipeline.
pub async fn pipeline(
    ctx: &Context,
    nodes: &[Arc<Node>],
    store: &Store,
    input: Value,
) -> Result<Value> {
    let mut current = input;
    for node in nodes {
        ctx.check()?;
        let (output, _action) = node.run(ctx, store, current).await?;
        current = output;
    }
    Ok(current)
}

/// Run distinct `(node, input)` pairs in parallel; the result vector is in
/// declared order. All tasks run to completion; the first failing slot's
/// error is returned.
pub async fn run_concurrent(
    ctx: &Context,
    tasks: Vec<(Arc<Node>, Value)>,
    store: &Store,
) -> Result<Vec<Value>> {
    let handles: Vec<_> = tasks
        .into_iter()
        .map(|(node, input)| {
            let store = store.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let (output, _action) = node.run(&ctx, &store, input).await?;
                Ok(output)
            })
        })
        .collect();

    first_error_wins(handles).await
}

/// Run per-task nodes under a concurrency cap with configurable error
/// semantics.
///
/// With [`ErrorMode::FailFast`], the first failure cancels the in-flight
/// siblings (through a shared child context) and is returned; cancelled
/// slots are not reported separately. With [`ErrorMode::Continue`], every
/// task finishes and failures are collected into [`Error::Aggregate`],
/// keyed by slot index.
pub async fn run_parallel(
    ctx: &Context,
    tasks: Vec<(Arc<Node>, Value)>,
    store: &Store,
    config: ParallelConfig,
) -> Result<Vec<Value>> {
    let semaphore = config
        .max_concurrency
        .map(|cap| Arc::new(Semaphore::new(cap.max(1))));
    let fail_fast = config.error_mode == ErrorMode::FailFast;
    // Siblings run under a shared child scope so one failure can stop the
    // rest without touching the caller's context.
    let task_ctx = ctx.child();

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|(node, input)| {
            let store = store.clone();
            let task_ctx = task_ctx.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| Error::Cancelled)?,
                    ),
                    None => None,
                };
                match node.run(&task_ctx, &store, input).await {
                    Ok((output, _action)) => Ok(output),
                    Err(err) => {
                        if fail_fast && !err.is_cancelled() {
                            debug!(node = node.name(), "fail-fast: cancelling siblings");
                            task_ctx.cancel();
                        }
                        Err(err)
                    }
                }
            })
        })
        .collect();

    let mut outputs = Vec::with_capacity(handles.len());
    let mut failures: Vec<(usize, Error)> = Vec::new();
    for (slot, handle) in handles.into_iter().enumerate() {
        match join(handle).await {
            Ok(output) => outputs.push(output),
            Err(err) => failures.push((slot, err)),
        }
    }

    if failures.is_empty() {
        return Ok(outputs);
    }
    if fail_fast {
        // Prefer the error that triggered the cancellation over the
        // cancellations it caused.
        let real = failures
            .iter()
            .position(|(_, err)| !err.is_cancelled())
            .unwrap_or(0);
        return Err(failures.swap_remove(real).1);
    }
    Err(Error::Aggregate(failures))
}

/// Join handles in slot order; all slots complete before the first error
/// (by slot order) is surfaced.
async fn first_error_wins(handles: Vec<JoinHandle<Result<Value>>>) -> Result<Vec<Value>> {
    let mut outputs = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        match join(handle).await {
            Ok(output) => outputs.push(output),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    match first_error {
        None => Ok(outputs),
        Some(err) => Err(err),
    }
}

async fn join(handle: JoinHandle<Result<Value>>) -> Result<Value> {
    match handle.await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(Error::Cancelled),
    }
}
