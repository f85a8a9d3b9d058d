//! Transport → window store → transport/cache flows.
//!
//! The composition the runtime exists for: envelopes delivered through a
//! durable route land in the block store, combined outputs are published
//! back through the transport, and handler writes invalidate the cache
//! in front of the backing state.

use ism_01_routing::{MessageCallback, Route, RouteConfig, RouteMode, RouteOptions, TransportError};
use ism_02_windowing::{join_combine, BlockStore, BlockStoreConfig, WindowError};
use ism_03_caching::{call_cached, CacheError, CachedBackend};
use parking_lot::Mutex;
use serde_json::json;
use shared_types::{Data, KeyDefinition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn plain_config(selector: &str, subject: &str, url: &str) -> RouteConfig {
    RouteConfig {
        selector: selector.to_string(),
        name: None,
        queue: None,
        subject: subject.to_string(),
        url: url.to_string(),
        max_ack_pending: None,
        ack_wait: None,
        mode: None,
        batch_size: None,
    }
}

fn pull_config(selector: &str, subject: &str, url: &str) -> RouteConfig {
    let mut config = plain_config(selector, subject, url);
    config.name = Some(format!("{}-stream", subject.replace('.', "-")));
    config.queue = Some("workers".to_string());
    config.mode = Some(RouteMode::Pull);
    config.batch_size = Some(10);
    config
}

/// Waits until `check` passes or the deadline lapses.
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

/// Builds the ingest handler: envelope → block store → output route.
fn correlation_handler(store: Arc<BlockStore>, output: Arc<Route>) -> MessageCallback {
    Arc::new(move |envelope| {
        let mut event = envelope.as_map()?;
        let source = event
            .remove("source")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| TransportError::Decode("event without source".to_string()))?;

        let result = store.add_data(&source, event, &mut |combined| {
            let output = Arc::clone(&output);
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|e| WindowError::Callback(e.to_string()))?;
            handle.spawn(async move {
                if let Err(e) = output.publish(combined).await {
                    tracing::error!(error = %e, "failed to publish combined output");
                }
            });
            Ok(())
        });
        result.map_err(|e| TransportError::Publish(e.to_string()))?;

        envelope.ack()
    })
}

#[tokio::test]
async fn test_routed_correlation_pipeline() {
    crate::support::init_test_logging();
    let url = "mem://it-pipeline";

    let mut window = BlockStoreConfig::new(vec![KeyDefinition::named("id")]);
    window.block_part_max_join_count = 1;
    window.block_part_max_age = Duration::from_secs(15);
    let store = Arc::new(BlockStore::new(window, Arc::new(join_combine)));

    let output = Arc::new(Route::from_config(
        plain_config("processor/state/joined", "processor.state.joined", url),
        None,
        RouteOptions::default(),
    ));

    // Collector on the output subject.
    let joined = Arc::new(Mutex::new(Vec::<Data>::new()));
    let sink = Arc::clone(&joined);
    let collector = Route::from_config(
        plain_config("processor/state/collector", "processor.state.joined", url),
        Some(Arc::new(move |envelope| {
            sink.lock().push(envelope.as_map()?);
            envelope.ack()
        })),
        RouteOptions::default(),
    );
    collector.subscribe().await.unwrap();

    // Ingest route feeding the block store.
    let ingest = Route::from_config(
        pull_config("processor/state/join", "processor.state.join", url),
        Some(correlation_handler(Arc::clone(&store), Arc::clone(&output))),
        RouteOptions {
            pull_max_wait: Some(Duration::from_millis(100)),
            ..RouteOptions::default()
        },
    );
    ingest.subscribe().await.unwrap();

    // One event per source, same key: exactly one joined output.
    let producer = Route::from_config(
        plain_config("processor/state/producer", "processor.state.join", url),
        None,
        RouteOptions::default(),
    );
    let mut first = Data::new();
    first.insert("source".to_string(), json!("src1"));
    first.insert("id".to_string(), json!("k"));
    first.insert("a".to_string(), json!(1));
    producer.publish(first).await.unwrap();

    let mut second = Data::new();
    second.insert("source".to_string(), json!("src2"));
    second.insert("id".to_string(), json!("k"));
    second.insert("b".to_string(), json!(2));
    producer.publish(second).await.unwrap();

    assert!(
        wait_for(|| !joined.lock().is_empty(), Duration::from_secs(3)).await,
        "joined output never arrived"
    );

    let outputs = joined.lock();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0]["id"], json!("k"));
    assert_eq!(outputs[0]["a"], json!(1));
    assert_eq!(outputs[0]["b"], json!(2));
    assert!(outputs[0].contains_key("joinedAt"));
    drop(outputs);

    ingest.unsubscribe().await.unwrap();
    collector.unsubscribe().await.unwrap();
    store.shutdown();
}

/// A minimal persisted state store standing in for the out-of-scope
/// storage layer: deterministic reads, mutating writes.
struct StateStore {
    rows: Mutex<HashMap<String, String>>,
    reads: AtomicUsize,
}

impl StateStore {
    fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    fn find_state(&self, id: &str) -> Result<Option<String>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().get(id).cloned())
    }

    fn save_state(&self, id: &str, value: &str) {
        self.rows.lock().insert(id.to_string(), value.to_string());
    }
}

fn cached_read(
    backend: &CachedBackend,
    store: &StateStore,
    id: &str,
) -> Result<Option<String>, CacheError> {
    call_cached(backend, "find_state", &[json!(id)], || store.find_state(id))
}

#[tokio::test]
async fn test_handler_writes_invalidate_cache() {
    let url = "mem://it-cache-coherence";

    let state = Arc::new(StateStore::new());
    state.save_state("s1", "v0");
    let backend = Arc::new(CachedBackend::new(None, Duration::from_secs(60)));

    // Cold read populates the cache.
    assert_eq!(cached_read(&backend, &state, "s1").unwrap().as_deref(), Some("v0"));
    assert_eq!(cached_read(&backend, &state, "s1").unwrap().as_deref(), Some("v0"));
    assert_eq!(state.reads.load(Ordering::SeqCst), 1);

    // Handler applies the write, then invalidates the cached read.
    let handler_state = Arc::clone(&state);
    let handler_backend = Arc::clone(&backend);
    let applied = Arc::new(AtomicUsize::new(0));
    let applied_count = Arc::clone(&applied);
    let route = Route::from_config(
        plain_config("processor/state/update", "processor.state.update", url),
        Some(Arc::new(move |envelope| {
            let event = envelope.as_map()?;
            let id = event["id"].as_str().unwrap_or_default().to_string();
            let value = event["value"].as_str().unwrap_or_default().to_string();

            handler_state.save_state(&id, &value);
            handler_backend
                .invalidate_method("find_state", &[json!(id)])
                .map_err(|e| TransportError::Publish(e.to_string()))?;

            applied_count.fetch_add(1, Ordering::SeqCst);
            envelope.ack()
        })),
        RouteOptions::default(),
    );
    route.subscribe().await.unwrap();

    let producer = Route::from_config(
        plain_config("processor/state/updater", "processor.state.update", url),
        None,
        RouteOptions::default(),
    );
    let mut update = Data::new();
    update.insert("id".to_string(), json!("s1"));
    update.insert("value".to_string(), json!("v1"));
    producer.publish(update).await.unwrap();

    assert!(
        wait_for(|| applied.load(Ordering::SeqCst) == 1, Duration::from_secs(3)).await,
        "update never applied"
    );

    // The read after the invalidation observes the handler's write.
    assert_eq!(cached_read(&backend, &state, "s1").unwrap().as_deref(), Some("v1"));
    assert_eq!(state.reads.load(Ordering::SeqCst), 2);

    route.unsubscribe().await.unwrap();
}
