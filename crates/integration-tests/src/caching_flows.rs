//! TTL cache and cached backend flows.

use ism_03_caching::{
    call_cached, Cache, CacheError, CachedBackend, LocalCache, LocalCacheOptions,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_ttl_eviction_timeline() {
    let cache = LocalCache::with_options(LocalCacheOptions {
        default_ttl: Duration::from_millis(200),
        cleanup_interval: Duration::from_millis(50),
    });

    cache.set("k", Arc::new("v".to_string()), Duration::ZERO);

    // t=100ms: inside the TTL.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let hit = cache.get("k").and_then(|v| v.downcast::<String>().ok());
    assert_eq!(hit.as_deref().map(String::as_str), Some("v"));

    // t=250ms: expired, and the cleanup loop has drained the heap.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.get("k").is_none());
    assert!(
        wait_for(|| cache.heap_len() == 0, Duration::from_millis(500)).await,
        "cleanup never drained the heap"
    );
    cache.close();
}

async fn wait_for(mut check: impl FnMut() -> bool, deadline: Duration) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

struct CountingBackend {
    calls: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn find_by_id(&self, id: &str) -> Result<String, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("row-{id}"))
    }

    fn find_state_full(&self, id: &str, flags: u32) -> Result<String, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("state-{id}-{flags}"))
    }
}

#[test]
fn test_cached_read_and_exact_invalidation() {
    let base = CountingBackend::new();
    let backend = CachedBackend::new(None, Duration::from_secs(60));

    let read = |backend: &CachedBackend, base: &CountingBackend| -> String {
        call_cached(backend, "find_by_id", &[json!("x")], || base.find_by_id("x")).unwrap()
    };

    assert_eq!(read(&backend, &base), "row-x");
    assert_eq!(base.calls.load(Ordering::SeqCst), 1);

    // Cached: the counter holds.
    assert_eq!(read(&backend, &base), "row-x");
    assert_eq!(base.calls.load(Ordering::SeqCst), 1);

    backend.invalidate_method("find_by_id", &[json!("x")]).unwrap();
    assert_eq!(read(&backend, &base), "row-x");
    assert_eq!(base.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_prefix_invalidation_scopes_to_first_argument() {
    let base = CountingBackend::new();
    let backend = CachedBackend::new(None, Duration::from_secs(60));

    let read = |id: &str, flags: u32| -> String {
        call_cached(
            &backend,
            "find_state_full",
            &[json!(id), json!(flags)],
            || base.find_state_full(id, flags),
        )
        .unwrap()
    };

    read("s1", 1);
    read("s1", 2);
    read("s2", 1);
    assert_eq!(base.calls.load(Ordering::SeqCst), 3);

    backend.invalidate_method_prefix("find_state_full", &[json!("s1")]);

    // Both s1 variations refetch; the s2 entry is untouched.
    read("s1", 1);
    read("s1", 2);
    assert_eq!(base.calls.load(Ordering::SeqCst), 5);
    read("s2", 1);
    assert_eq!(base.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_single_flight_under_concurrent_misses() {
    let backend = Arc::new(CachedBackend::new(None, Duration::from_secs(60)));
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let backend = Arc::clone(&backend);
        let fetches = Arc::clone(&fetches);
        handles.push(tokio::task::spawn_blocking(move || {
            call_cached::<u64, CacheError, _>(&backend, "slow_read", &[json!("k")], || {
                fetches.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(7)
            })
            .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 7);
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}
