use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use workgraph::{BoundedConfig, Context, Store, TypedStore, Value};

#[test]
fn scope_composition_matches_physical_keys() {
    let ctx = Context::new();
    let store = Store::memory();

    store.set(&ctx, "a:b:k", Value::from(1i64)).unwrap();
    assert_eq!(
        store.scope("a").scope("b").get("k"),
        store.get("a:b:k"),
        "nested scopes must read through to the root key"
    );

    // And the other direction: a scoped write lands on the prefixed key.
    store
        .scope("x")
        .scope("y")
        .set(&ctx, "k", Value::from(2i64))
        .unwrap();
    assert_eq!(store.get("x:y:k"), Some(Value::from(2i64)));
}

#[test]
fn scopes_share_limits_and_stats() {
    let ctx = Context::new();
    let store = Store::bounded(BoundedConfig::new(2));
    let scoped = store.scope("s");

    scoped.set(&ctx, "a", Value::from(1i64)).unwrap();
    store.set(&ctx, "b", Value::from(2i64)).unwrap();
    scoped.set(&ctx, "c", Value::from(3i64)).unwrap();

    // Three writes through two handles, one shared capacity of two.
    assert_eq!(store.len(), 2);
    assert_eq!(scoped.stats(), store.stats());
    assert_eq!(store.stats().evictions, 1);
}

#[tokio::test]
async fn bounded_store_evicts_lru_and_reports_keys() {
    let ctx = Context::new();
    let evicted: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen = Arc::clone(&evicted);

    let store = Store::bounded(
        BoundedConfig::new(2)
            .ttl(Duration::from_secs(3600))
            .on_evict(move |key, _value| seen.lock().push(key.to_string())),
    );

    store.set(&ctx, "a", Value::from(1i64)).unwrap();
    store.set(&ctx, "b", Value::from(2i64)).unwrap();
    store.set(&ctx, "c", Value::from(3i64)).unwrap();

    assert_eq!(store.get("a"), None);
    assert_eq!(evicted.lock().as_slice(), ["a"]);
}

#[tokio::test]
async fn lru_survivors_are_the_most_recent() {
    let ctx = Context::new();
    let store = Store::bounded(BoundedConfig::new(3));

    for (i, key) in ["k1", "k2", "k3", "k4", "k5"].iter().enumerate() {
        store.set(&ctx, *key, Value::from(i as i64)).unwrap();
    }

    // With no intermediate reads, survivors are exactly the last three.
    assert_eq!(store.get("k1"), None);
    assert_eq!(store.get("k2"), None);
    assert!(store.get("k3").is_some());
    assert!(store.get("k4").is_some());
    assert!(store.get("k5").is_some());
}

#[tokio::test]
async fn reading_spares_an_entry_from_eviction() {
    let ctx = Context::new();
    let store = Store::bounded(BoundedConfig::new(2));

    store.set(&ctx, "old", Value::from(1i64)).unwrap();
    store.set(&ctx, "mid", Value::from(2i64)).unwrap();
    store.get("old");
    store.set(&ctx, "new", Value::from(3i64)).unwrap();

    assert!(store.get("old").is_some());
    assert_eq!(store.get("mid"), None);
}

#[tokio::test(start_paused = true)]
async fn ttl_expiry_observed_on_read() {
    let ctx = Context::new();
    let store = Store::bounded(BoundedConfig::new(8).ttl(Duration::from_secs(60)));

    store.set(&ctx, "k", Value::from(1i64)).unwrap();
    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(store.get("k").is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(store.get("k"), None);

    let stats = store.stats();
    assert_eq!(stats.evictions, 0, "expiry on read is a miss, not an eviction");
    assert_eq!(stats.size, 0);
}

#[tokio::test(start_paused = true)]
async fn refreshed_entries_outlive_the_original_ttl() {
    let ctx = Context::new();
    let store = Store::bounded(BoundedConfig::new(8).ttl(Duration::from_secs(60)));

    store.set(&ctx, "k", Value::from(1i64)).unwrap();
    tokio::time::advance(Duration::from_secs(45)).await;
    store.set(&ctx, "k", Value::from(2i64)).unwrap();
    tokio::time::advance(Duration::from_secs(45)).await;

    assert_eq!(store.get("k"), Some(Value::from(2i64)));
}

#[tokio::test(start_paused = true)]
async fn sweeper_reclaims_expired_entries() {
    let ctx = Context::new();
    let evicted: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen = Arc::clone(&evicted);

    let store = Store::bounded(
        BoundedConfig::new(8)
            .ttl(Duration::from_secs(10))
            .sweep_interval(Duration::from_secs(5))
            .on_evict(move |key, _| seen.lock().push(key.to_string())),
    );

    store.set(&ctx, "k", Value::from(1i64)).unwrap();
    tokio::time::advance(Duration::from_secs(16)).await;
    // Let the sweeper task observe its ticks.
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    assert_eq!(store.len(), 0);
    assert_eq!(evicted.lock().as_slice(), ["k"]);
}

#[test]
fn stats_track_distinct_counters() {
    let ctx = Context::new();
    let store = Store::bounded(BoundedConfig::new(2));

    store.set(&ctx, "a", Value::from(1i64)).unwrap();
    store.set(&ctx, "b", Value::from(2i64)).unwrap();
    store.set(&ctx, "c", Value::from(3i64)).unwrap(); // evicts "a"
    store.get("b"); // hit
    store.get("a"); // miss
    store.delete(&ctx, "b").unwrap();

    let stats = store.stats();
    assert_eq!(stats.sets, 3);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.size, 1);
    assert_eq!(stats.max_size, 2);
}

#[test]
fn typed_store_distinguishes_absence_from_mismatch() {
    let ctx = Context::new();
    let store = Store::memory();
    store.set(&ctx, "text", "hello").unwrap();

    let numbers: TypedStore<i64> = TypedStore::new(store.clone());
    assert!(numbers.get("missing").unwrap().is_none());
    assert!(numbers.get("text").is_err());

    let texts: TypedStore<String> = TypedStore::new(store);
    assert_eq!(texts.get("text").unwrap(), Some("hello".to_string()));
}
