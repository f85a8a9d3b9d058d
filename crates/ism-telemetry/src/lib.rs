//! # Telemetry - Structured Logging Initialization
//!
//! One place to configure the `tracing` stack for processors built on
//! the runtime. Log lines emitted by the subsystems (block store
//! transitions, transport lifecycle, cache invalidations) are structured
//! events; this crate installs the subscriber that renders them, either
//! human-readable for development or JSON for log shippers.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;

pub use config::TelemetryConfig;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Errors from telemetry initialization.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The subscriber could not be installed (usually: already set).
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

/// Installs the global `tracing` subscriber per `config`.
///
/// `RUST_LOG` overrides the configured log level. Safe to call once per
/// process; a second call fails with [`TelemetryError::Init`].
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string()))?;
    }

    tracing::info!(service = %config.service_name, "logging initialized");
    Ok(())
}
