//! Error types for the engine.
//!
//! Phase functions and [`NodeBackend`](crate::node::NodeBackend)
//! implementations return boxed errors; the engine wraps them into the
//! variants below so callers can match on what failed and where. A run
//! returns exactly one error (possibly wrapping a prior one); callers must
//! assume partial store effects on any non-success, because nodes before the
//! failing one have already run their Post phases.

use std::fmt;
use std::time::Duration;

use crate::value::ValueKind;

/// Boxed error type used at the phase-function boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One of the three lifecycle phases of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prep,
    Exec,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Prep => write!(f, "prep"),
            Phase::Exec => write!(f, "exec"),
            Phase::Post => write!(f, "post"),
        }
    }
}

/// Errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input handed to a node is not assignable to its declared input
    /// type. Returned before any phase runs.
    #[error("node '{node}' expected {expected} input, got {actual}")]
    InvalidInput {
        node: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// A lifecycle phase returned an error.
    #[error("{phase} phase failed in node '{node}'")]
    PhaseFailed {
        node: String,
        phase: Phase,
        #[source]
        source: BoxError,
    },

    /// A phase did not complete within its configured timeout. The phase's
    /// context is cancelled at the deadline; for Exec this counts as a
    /// retryable attempt failure.
    #[error("{phase} phase of node '{node}' timed out after {limit:?}")]
    Timeout {
        node: String,
        phase: Phase,
        limit: Duration,
    },

    /// Exec failed on the initial attempt and every retry, and the node has
    /// no fallback.
    #[error("node '{node}' exhausted {attempts} exec attempts")]
    RetriesExhausted {
        node: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// The fallback itself failed after Exec retries were exhausted.
    #[error("fallback failed in node '{node}'")]
    FallbackFailed {
        node: String,
        #[source]
        source: BoxError,
    },

    /// The run's context was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// The connection validator found an edge whose source output type is
    /// not assignable to the target input type.
    #[error(
        "edge '{action}' from '{from}' to '{to}': {output} is not assignable to {input}"
    )]
    TypeMismatch {
        from: String,
        to: String,
        action: String,
        output: ValueKind,
        input: ValueKind,
    },

    /// A typed store read found a value under the key that does not decode
    /// as the expected type. Distinct from absence.
    #[error("value at '{key}' is not a {expected}")]
    TypeAssertion { key: String, expected: &'static str },

    /// A value could not be serialized or deserialized.
    #[error("serialization error")]
    Serialization(#[from] serde_json::Error),

    /// An opaque value crossed a boundary that requires JSON representation.
    #[error("opaque values have no JSON representation")]
    OpaqueValue,

    /// A node referenced by name does not exist.
    #[error("unknown node '{0}'")]
    MissingNode(String),

    /// One or more slots of a continue-mode parallel run failed. Each entry
    /// carries the slot index of the failed task.
    #[error("{} parallel task(s) failed", .0.len())]
    Aggregate(Vec<(usize, Error)>),

    /// Graph construction found unresolved references.
    #[error("graph construction failed with {} issue(s)", .0.len())]
    Build(Vec<BuildIssue>),
}

/// A single problem found while resolving a [`GraphBuilder`].
///
/// [`GraphBuilder`]: crate::compose::GraphBuilder
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildIssue {
    #[error("no start node configured")]
    NoStart,
    #[error("start node '{0}' is not registered")]
    UnknownStart(String),
    #[error("edge source '{0}' is not registered")]
    UnknownSource(String),
    #[error("edge target '{to}' of '{from}' -[{action}]-> '{to}' is not registered")]
    UnknownTarget {
        from: String,
        action: String,
        to: String,
    },
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),
}

impl Error {
    /// Whether this error is (or aggregates only) cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Aggregate(errors) => errors.iter().all(|(_, e)| e.is_cancelled()),
            _ => false,
        }
    }
}
