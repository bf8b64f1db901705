//! Cooperative cancellation threaded through every phase.
//!
//! A [`Context`] wraps a cancellation token and an execution id. The token
//! is checked at phase boundaries, observed during retry sleeps, and handed
//! to phases as a child so a phase timeout can cancel the phase's own scope
//! without touching the run. Cancellation is cooperative: phases that block
//! must select on [`Context::cancelled`] to return promptly.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Cancellation handle and correlation id for one run.
///
/// Cheap to clone; clones share the same token. [`Context::child`] creates a
/// scope that is cancelled when the parent is, but can also be cancelled on
/// its own (per-phase deadlines, fail-fast siblings).
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    execution_id: Uuid,
}

impl Context {
    /// A fresh root context with a new execution id.
    pub fn new() -> Self {
        Context {
            token: CancellationToken::new(),
            execution_id: Uuid::new_v4(),
        }
    }

    /// Id correlating log lines and store keys of one run.
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Request cancellation of this context and all its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when this context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// A child scope: cancelled with the parent, cancellable on its own.
    /// Keeps the parent's execution id.
    pub fn child(&self) -> Context {
        Context {
            token: self.token.child_token(),
            execution_id: self.execution_id,
        }
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_follows_parent() {
        let parent = Context::new();
        let child = parent.child();
        assert_eq!(parent.execution_id(), child.execution_id());
        assert!(child.check().is_ok());

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn child_cancel_does_not_reach_parent() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }
}
