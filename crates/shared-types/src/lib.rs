//! # Shared Types - Common Building Blocks for the ISM Runtime
//!
//! Foundation crate used by every subsystem. Holds the dynamic event
//! payload type, the composite-key field definitions used by the
//! windowed correlation engine, environment-backed configuration
//! helpers, and a small stopwatch for runtime statistics.
//!
//! Nothing in here spawns tasks or performs I/O; this crate stays at the
//! bottom of the dependency graph so every subsystem can share its types
//! without pulling in the runtime stack.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod data;
pub mod env;
pub mod key_definition;
pub mod statistics;

// Re-export main types
pub use data::{Data, Value};
pub use key_definition::KeyDefinition;
pub use statistics::Statistics;
