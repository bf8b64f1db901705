//! Shared state for workflow runs.
//!
//! A [`Store`] is the only globally shared mutable resource of a run: a
//! thread-safe key/value map with prefix scoping and an optional bound
//! (max entries + TTL with LRU eviction). Two concrete handle types enforce
//! the phase capability split at the type level: Prep receives a
//! [`StoreReader`] (get + scope), Post receives the full [`Store`].
//!
//! Scoping is a naming discipline, not an isolation mechanism:
//! `store.scope("a").scope("b").get("k")` reads the same entry as
//! `store.get("a:b:k")`, and scopes share the underlying storage, limits,
//! eviction callback, and statistics with their root.

mod bounded;
mod memory;
mod typed;

pub use bounded::{BoundedBackend, BoundedConfig, EvictionCallback};
pub use memory::MemoryBackend;
pub use typed::TypedStore;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::context::Context;
use crate::error::Result;
use crate::value::Value;

/// Counter snapshot for a store.
///
/// Evictions (capacity pressure, sweeper) and explicit deletes are distinct
/// counters; an expired entry discovered by a read counts as a miss, not an
/// eviction. `max_size` is zero for unbounded stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
}

/// Storage behind a [`Store`]. Implementations are internally synchronized;
/// handles clone freely across tasks.
pub trait StorageBackend: Send + Sync {
    /// Read a value. Absence is `None`; reads never fail.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value, with an optional per-entry TTL override. Unbounded
    /// backends ignore the TTL.
    fn set(&self, key: String, value: Value, ttl: Option<Duration>);

    /// Remove a value, reporting whether it was present.
    fn delete(&self, key: &str) -> bool;

    /// Drop every entry.
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> StoreStats;
}

/// Write-capable handle on shared workflow state.
///
/// Cloning is cheap (an `Arc` and a prefix); all clones and scopes see the
/// same entries. `set` and `delete` fail only when the context has been
/// cancelled; `get` cannot fail.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
}

impl Store {
    /// An unbounded in-memory store.
    pub fn memory() -> Self {
        Store::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// A bounded in-memory store with LRU eviction and per-entry TTL.
    ///
    /// Must be called from within a tokio runtime when
    /// [`BoundedConfig::sweep_interval`] is set, since the sweeper runs as a
    /// background task.
    pub fn bounded(config: BoundedConfig) -> Self {
        Store::with_backend(bounded::spawn(config))
    }

    /// Wrap a custom backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Store {
            backend,
            prefix: String::new(),
        }
    }

    fn physical(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Read a value. Absence is `None`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.backend.get(&self.physical(key))
    }

    /// Write a value. Fails only on cancelled context.
    pub fn set(&self, ctx: &Context, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        ctx.check()?;
        self.backend.set(self.physical(&key.into()), value.into(), None);
        Ok(())
    }

    /// Write a value with its own TTL. Bounded backends honor the override;
    /// unbounded backends store the value without expiry.
    pub fn set_with_ttl(
        &self,
        ctx: &Context,
        key: impl Into<String>,
        value: impl Into<Value>,
        ttl: Duration,
    ) -> Result<()> {
        ctx.check()?;
        self.backend
            .set(self.physical(&key.into()), value.into(), Some(ttl));
        Ok(())
    }

    /// Remove a value. Fails only on cancelled context.
    pub fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        ctx.check()?;
        self.backend.delete(&self.physical(key));
        Ok(())
    }

    /// A view whose keys are prefixed with `prefix + ":"`. Shares storage,
    /// limits, callback, and statistics with this store.
    pub fn scope(&self, prefix: &str) -> Store {
        Store {
            backend: Arc::clone(&self.backend),
            prefix: format!("{}{}:", self.prefix, prefix),
        }
    }

    /// The read-only capability handed to Prep phases.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            store: self.clone(),
        }
    }

    /// Drop every entry of the underlying storage (scopes included, since
    /// the storage is shared).
    pub fn clear(&self) {
        self.backend.clear();
    }

    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        self.backend.stats()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("prefix", &self.prefix)
            .field("len", &self.backend.len())
            .finish()
    }
}

/// Read-only handle on shared workflow state: get + scope, nothing else.
///
/// Prep phases receive this type so store misuse is a compile error rather
/// than a runtime surprise.
#[derive(Debug, Clone)]
pub struct StoreReader {
    store: Store,
}

impl StoreReader {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    pub fn scope(&self, prefix: &str) -> StoreReader {
        StoreReader {
            store: self.store.scope(prefix),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}
