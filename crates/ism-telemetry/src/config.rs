//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for a processor.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name stamped on the startup line.
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON formatted logs (default on in containers).
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ism-runtime".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Builds configuration from environment variables.
    ///
    /// - `ISM_SERVICE_NAME`: service name (default: ism-runtime)
    /// - `ISM_LOG_LEVEL` or `RUST_LOG`: log level (default: info)
    /// - `ISM_JSON_LOGS`: JSON output (default: true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("ISM_SERVICE_NAME")
                .unwrap_or_else(|_| "ism-runtime".to_string()),

            log_level: env::var("ISM_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("ISM_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Configuration for a named processor service.
    pub fn for_service(service_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = service_name.to_string();
        config
    }
}
