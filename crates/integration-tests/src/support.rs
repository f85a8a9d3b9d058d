//! Shared fixtures for integration flows.

use ism_01_routing::{RouteConfig, RouteRegistry};
use ism_telemetry::TelemetryConfig;

/// Installs the logging stack once for the test process; later calls
/// are no-ops.
pub fn init_test_logging() {
    let _ = ism_telemetry::init_logging(&TelemetryConfig::for_service("integration-tests"));
}

/// Builds a registry with one plain route and one durable pull route,
/// both pointed at the given in-memory broker URL.
pub fn two_route_registry(url: &str) -> RouteRegistry {
    RouteRegistry::from_routes(vec![
        RouteConfig {
            selector: "processor/usage".to_string(),
            name: None,
            queue: None,
            subject: "processor.usage".to_string(),
            url: url.to_string(),
            max_ack_pending: None,
            ack_wait: None,
            mode: None,
            batch_size: None,
        },
        RouteConfig {
            selector: "language/models/openai/*".to_string(),
            name: Some("models-openai".to_string()),
            queue: Some("openai-workers".to_string()),
            subject: "processor.models.openai".to_string(),
            url: url.to_string(),
            max_ack_pending: Some(1024),
            ack_wait: Some(30),
            mode: Some(ism_01_routing::RouteMode::Pull),
            batch_size: Some(10),
        },
    ])
}

/// A routing document equivalent to [`two_route_registry`], for tests
/// exercising the file loading path.
pub fn routing_yaml(url: &str) -> String {
    format!(
        r#"messageConfig:
  routes:
    - selector: "processor/usage"
      subject: "processor.usage"
      url: "{url}"
    - selector: "language/models/openai/*"
      name: "models-openai"
      queue: "openai-workers"
      subject: "processor.models.openai"
      url: "{url}"
      max_ack_pending: 1024
      ack_wait: 30
      mode: "pull"
      batch_size: 10
"#
    )
}
