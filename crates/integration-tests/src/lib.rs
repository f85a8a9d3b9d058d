//! # Integration Tests Crate
//!
//! Verifies the subsystems working together the way a processor uses
//! them: routes resolved from a registry deliver envelopes, handlers
//! feed the windowed block store, combined outputs flow back out through
//! the transport, and handler writes invalidate the cache coherently.
//!
//! ## Structure
//!
//! ```text
//! integration-tests/
//! └── src/
//!     ├── lib.rs              # This file
//!     ├── support.rs          # Shared fixtures (registries, callbacks)
//!     ├── routing_flows.rs    # Registry + transport end-to-end flows
//!     ├── pipeline_flows.rs   # Transport → window store → transport/cache
//!     └── caching_flows.rs    # TTL cache and cached backend flows
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod support;

#[cfg(test)]
mod caching_flows;
#[cfg(test)]
mod pipeline_flows;
#[cfg(test)]
mod routing_flows;
