//! # Routing Subsystem - Registry, Transport and Subject Demultiplexer
//!
//! Everything between a processor and its message broker:
//!
//! - **Route registry** ([`config`]): maps symbolic selectors (with a
//!   trailing `/*` wildcard form) to concrete transport configurations
//!   loaded from a YAML routing document.
//! - **Transport** ([`route`]): a uniform connect/publish/request/
//!   subscribe surface over a pluggable [`ports::Broker`]. Durable
//!   consumers (stream name + queue group) get acked, queue-balanced
//!   delivery; everything else is best-effort pub/sub. Pull-mode
//!   subscriptions run a background fetcher with bounded waits.
//! - **Subject demultiplexer** ([`demux`]): optional per-route fan-out of
//!   inbound messages onto per-subject buffered channels with TTL
//!   eviction, for request-response patterns over suffixed subjects.
//!
//! The shipped broker adapter ([`adapters::MemoryBroker`]) is an
//! in-process implementation suitable for single-node deployments and
//! tests; a networked broker plugs in at the [`ports::Broker`] seam
//! without touching routes or handlers.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod demux;
pub mod envelope;
pub mod errors;
pub mod payload;
pub mod ports;
pub mod route;

// Re-export main types
pub use adapters::MemoryBroker;
pub use config::{RouteConfig, RouteMode, RouteRegistry};
pub use demux::SubjectChannels;
pub use envelope::MessageEnvelope;
pub use errors::{ConfigError, TransportError};
pub use payload::MessagePayload;
pub use ports::{Broker, PullSubscription, SubscriptionSpec};
pub use route::{MessageCallback, Route, RouteOptions};

use std::time::Duration;

/// Environment variable naming the routing document.
pub const ROUTING_FILE_ENV: &str = "ROUTING_FILE";

/// Default routing document path when `ROUTING_FILE` is unset.
pub const DEFAULT_ROUTING_FILE: &str = "../routing-nats.yaml";

/// Environment variable overriding the demux channel TTL.
pub const SUBJECT_CHANNEL_TTL_ENV: &str = "SUBJECT_CHANNEL_TTL_DURATION";

/// Default demux channel TTL.
pub const DEFAULT_SUBJECT_CHANNEL_TTL: Duration = Duration::from_secs(10);

/// Default batch size for pull-mode fetches.
pub const DEFAULT_PULL_BATCH_SIZE: usize = 10;

/// Bounded wait of one pull-mode fetch.
pub const DEFAULT_PULL_MAX_WAIT: Duration = Duration::from_secs(5);
