//! Registry and transport end-to-end flows.

use crate::support::{routing_yaml, two_route_registry};
use ism_01_routing::{
    ConfigError, MessagePayload, Route, RouteConfig, RouteOptions, RouteRegistry,
    DEFAULT_PULL_MAX_WAIT,
};
use parking_lot::Mutex;
use serde_json::json;
use shared_types::data::data_from_pairs;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_wildcard_routing_end_to_end() {
    let registry = two_route_registry("mem://it-wildcard");

    // A concrete model selector resolves through the wildcard route.
    let openai = registry
        .find_by_selector_wildcard("language/models/openai/gpt-4")
        .unwrap();
    assert_eq!(openai.subject, "processor.models.openai");

    // An unknown provider misses.
    let err = registry
        .find_by_selector_wildcard("language/models/cohere/command")
        .unwrap_err();
    assert!(matches!(err, ConfigError::SelectorNotFound { .. }));

    // Adding an overlapping wildcard turns the same query ambiguous.
    let mut routes = registry.routes().to_vec();
    routes.push(RouteConfig {
        selector: "language/models/*".to_string(),
        name: None,
        queue: None,
        subject: "processor.models".to_string(),
        url: "mem://it-wildcard".to_string(),
        max_ack_pending: None,
        ack_wait: None,
        mode: None,
        batch_size: None,
    });
    let widened = RouteRegistry::from_routes(routes);
    let err = widened
        .find_by_selector_wildcard("language/models/openai/gpt-4")
        .unwrap_err();
    assert!(matches!(err, ConfigError::AmbiguousSelector { .. }));
}

#[test]
fn test_registry_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(routing_yaml("mem://it-file").as_bytes())
        .unwrap();

    let registry = RouteRegistry::load_file(file.path()).unwrap();
    assert_eq!(registry.routes().len(), 2);
    let durable = registry
        .find_by_subject("processor.models.openai")
        .unwrap();
    assert!(durable.durable());
}

#[tokio::test]
async fn test_subscribe_with_selector_roundtrip() {
    let registry = two_route_registry("mem://it-selector");
    let received = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&received);
    let route = Route::subscribe_with_selector(
        &registry,
        "processor/usage",
        Arc::new(move |envelope| {
            envelope.ack()?;
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        RouteOptions::default(),
    )
    .await
    .unwrap();

    let publisher = Route::from_config(
        registry.find_by_selector("processor/usage").unwrap().clone(),
        None,
        RouteOptions::default(),
    );
    publisher
        .publish(data_from_pairs([("tokens", json!(42))]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);
    route.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn test_connect_is_idempotent_through_route() {
    let registry = two_route_registry("mem://it-idempotent");
    let route = Route::connect_with_selector(&registry, "processor/usage", RouteOptions::default())
        .await
        .unwrap();
    // Repeated connects while connected are no-ops.
    route.connect().await.unwrap();
    route.connect().await.unwrap();
}

#[tokio::test]
async fn test_payload_roundtrip_through_transport() {
    let registry = two_route_registry("mem://it-roundtrip");
    let seen = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));

    let sink = Arc::clone(&seen);
    let route = Route::subscribe_with_selector(
        &registry,
        "processor/usage",
        Arc::new(move |envelope| {
            sink.lock().push(envelope.raw()?.to_vec());
            envelope.ack()
        }),
        RouteOptions::default(),
    )
    .await
    .unwrap();

    let raw = vec![0u8, 159, 146, 150];
    route.publish(raw.clone()).await.unwrap();
    route.publish("plain text").await.unwrap();
    route
        .publish(data_from_pairs([("id", json!("k")), ("n", json!(1))]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    let seen = seen.lock();
    assert_eq!(seen.len(), 3);

    // Bytes pass through untouched.
    assert_eq!(seen[0], raw);
    // Strings arrive as their UTF-8 bytes.
    assert_eq!(seen[1], b"plain text".to_vec());
    // Maps decode structurally equal.
    let decoded: serde_json::Value = serde_json::from_slice(&seen[2]).unwrap();
    assert_eq!(decoded, json!({"id": "k", "n": 1}));

    route.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn test_pull_loop_cancellation_latency() {
    let registry = two_route_registry("mem://it-cancel");
    // subscribe_with_selector resolves selectors exactly; it does not
    // fall back to wildcard routes.
    let route = Route::subscribe_with_selector(
        &registry,
        "language/models/openai/gpt-4x",
        Arc::new(|envelope| envelope.ack()),
        RouteOptions::default(),
    )
    .await;
    assert!(route.is_err());

    let route = Route::subscribe_with_selector(
        &registry,
        "language/models/openai/*",
        Arc::new(|envelope| envelope.ack()),
        RouteOptions::default(),
    )
    .await
    .unwrap();

    // No messages flowing: the fetcher sits inside its bounded wait.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    route.unsubscribe().await.unwrap();
    // The fetcher exits within one fetch window, not after it.
    assert!(started.elapsed() < DEFAULT_PULL_MAX_WAIT);
}

#[tokio::test]
async fn test_request_reply_over_route() {
    let registry = two_route_registry("mem://it-reqrep");
    let config = registry.find_by_selector("processor/usage").unwrap().clone();

    let broker = ism_01_routing::MemoryBroker::shared(&config.url);
    let responder = Route::from_config(config.clone(), None, RouteOptions::default());
    responder.connect().await.unwrap();

    // Responder answers on the envelope's reply subject.
    let reply_broker = Arc::clone(&broker);
    responder.set_callback(Arc::new(move |envelope| {
        let reply_subject = envelope
            .reply_subject()
            .expect("request carries a reply subject")
            .to_string();
        let broker = Arc::clone(&reply_broker);
        let body = envelope.raw()?.to_vec();
        tokio::spawn(async move {
            use ism_01_routing::Broker;
            let mut response = body;
            response.extend_from_slice(b"-ok");
            let _ = broker.publish(&reply_subject, response).await;
        });
        Ok(())
    }));
    responder.subscribe().await.unwrap();

    let requester = Route::from_config(config, None, RouteOptions::default());
    let reply = requester
        .request(MessagePayload::from("ping"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply.raw().unwrap(), b"ping-ok");

    responder.unsubscribe().await.unwrap();
}
