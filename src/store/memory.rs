//! Unbounded in-memory backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{StorageBackend, StoreStats};
use crate::value::Value;

/// HashMap-backed storage with no capacity bound and no expiry. Reads run
/// in parallel; writes are serialized by the lock.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, Value>>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<Value> {
        let found = self.data.read().get(key).cloned();
        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: String, value: Value, _ttl: Option<std::time::Duration>) {
        self.data.write().insert(key, value);
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn delete(&self, key: &str) -> bool {
        let removed = self.data.write().remove(key).is_some();
        if removed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    fn clear(&self) {
        self.data.write().clear();
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: 0,
            size: self.len(),
            max_size: 0,
        }
    }
}
