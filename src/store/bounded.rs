//! Bounded in-memory backend: max entry count, per-entry TTL, LRU eviction.
//!
//! One mutex guards the recency list and the counters; reads promote the
//! entry to most-recently-used, so they serialize like writes. Eviction
//! callbacks run after the lock is released; user code may call back into
//! the store from the callback.

use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{StorageBackend, StoreStats};
use crate::value::Value;

/// Invoked exactly once per evicted entry, after removal, with no lock held.
/// Explicit deletes and read-path expiry do not count as evictions.
pub type EvictionCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Construction options for a bounded store.
#[derive(Clone)]
pub struct BoundedConfig {
    max_entries: usize,
    ttl: Option<Duration>,
    on_evict: Option<EvictionCallback>,
    sweep_interval: Option<Duration>,
}

impl BoundedConfig {
    /// `max_entries` must be non-zero.
    pub fn new(max_entries: usize) -> Self {
        assert!(max_entries > 0, "bounded store requires max_entries > 0");
        BoundedConfig {
            max_entries,
            ttl: None,
            on_evict: None,
            sweep_interval: None,
        }
    }

    /// Default TTL applied to every entry. Individual writes may override it
    /// through [`Store::set_with_ttl`](crate::store::Store::set_with_ttl).
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Callback observing evicted entries.
    pub fn on_evict(mut self, callback: impl Fn(&str, &Value) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Arc::new(callback));
        self
    }

    /// Enable the background sweeper that reclaims expired entries. Without
    /// it, expired entries linger until a read or capacity pressure removes
    /// them; the difference is observable only as delayed reclamation and
    /// delayed callback firing.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct State {
    entries: LruCache<String, Entry>,
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
    evictions: u64,
}

/// The backend behind [`Store::bounded`](crate::store::Store::bounded).
pub struct BoundedBackend {
    state: Mutex<State>,
    max_entries: usize,
    default_ttl: Option<Duration>,
    on_evict: Option<EvictionCallback>,
}

/// Build the backend and attach the sweeper, if configured. The sweeper
/// holds a weak reference and exits once every store handle is dropped.
pub(super) fn spawn(config: BoundedConfig) -> Arc<BoundedBackend> {
    let backend = Arc::new(BoundedBackend::new(
        config.max_entries,
        config.ttl,
        config.on_evict,
    ));
    if let Some(interval) = config.sweep_interval {
        let weak = Arc::downgrade(&backend);
        tokio::spawn(run_sweeper(weak, interval));
    }
    backend
}

async fn run_sweeper(backend: Weak<BoundedBackend>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // the first tick completes immediately
    loop {
        ticker.tick().await;
        match backend.upgrade() {
            Some(backend) => {
                let swept = backend.sweep();
                if swept > 0 {
                    debug!(swept, "sweeper reclaimed expired entries");
                }
            }
            None => break,
        }
    }
}

impl BoundedBackend {
    pub fn new(
        max_entries: usize,
        default_ttl: Option<Duration>,
        on_evict: Option<EvictionCallback>,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_entries)
            .expect("bounded store requires max_entries > 0");
        BoundedBackend {
            state: Mutex::new(State {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                sets: 0,
                deletes: 0,
                evictions: 0,
            }),
            max_entries,
            default_ttl,
            on_evict,
        }
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<Instant> {
        ttl.or(self.default_ttl).map(|d| Instant::now() + d)
    }

    fn notify_evicted(&self, evicted: Vec<(String, Value)>) {
        if let Some(callback) = &self.on_evict {
            for (key, value) in &evicted {
                callback(key, value);
            }
        }
    }

    /// Remove every expired entry, firing the eviction callback for each.
    /// Returns the number of entries reclaimed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let evicted = {
            let mut state = self.state.lock();
            let expired: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            let mut evicted = Vec::with_capacity(expired.len());
            for key in expired {
                if let Some(entry) = state.entries.pop(&key) {
                    state.evictions += 1;
                    evicted.push((key, entry.value));
                }
            }
            evicted
        };
        let swept = evicted.len();
        self.notify_evicted(evicted);
        swept
    }
}

impl StorageBackend for BoundedBackend {
    fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired = state.entries.peek(key).is_some_and(|e| e.is_expired(now));
        if expired {
            // An expired read is a miss, not an eviction: no callback.
            state.entries.pop(key);
            state.misses += 1;
            return None;
        }
        let result = state.entries.get(key).map(|entry| entry.value.clone());
        match result {
            Some(value) => {
                state.hits += 1;
                Some(value)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    fn set(&self, key: String, value: Value, ttl: Option<Duration>) {
        let expires_at = self.expiry(ttl);
        let evicted = {
            let mut state = self.state.lock();
            state.sets += 1;
            if let Some(entry) = state.entries.get_mut(&key) {
                // Updating an existing key refreshes value, expiry, and
                // recency, and never evicts.
                entry.value = value;
                entry.expires_at = expires_at;
                Vec::new()
            } else {
                let mut evicted = Vec::new();
                if state.entries.len() >= self.max_entries {
                    if let Some((lru_key, lru_entry)) = state.entries.pop_lru() {
                        state.evictions += 1;
                        evicted.push((lru_key, lru_entry.value));
                    }
                }
                state.entries.put(key, Entry { value, expires_at });
                evicted
            }
        };
        self.notify_evicted(evicted);
    }

    fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.pop(key).is_some();
        if removed {
            state.deletes += 1;
        }
        removed
    }

    fn clear(&self) {
        self.state.lock().entries.clear();
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            hits: state.hits,
            misses: state.misses,
            sets: state.sets,
            deletes: state.deletes,
            evictions: state.evictions,
            size: state.entries.len(),
            max_size: self.max_entries,
        }
    }
}
