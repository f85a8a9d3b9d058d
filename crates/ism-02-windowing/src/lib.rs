//! # Windowing Subsystem - Sliding-Window Multi-Source Correlation
//!
//! Correlates events from two or more named sources by a composite key
//! within a sliding time window, combining matching events through a
//! pluggable strategy (join or merge) and evicting stale state.
//!
//! ## Structure
//!
//! - [`BlockStore`]: the engine. A map of correlation [`Block`]s (one per
//!   composite key) paired with an indexed min-heap ordered by eviction
//!   time. Each inbound event lands in its block, combines against every
//!   surviving part from the other sources, and refreshes the block's
//!   window.
//! - [`BlockPart`]: one wrapped inbound event. Parts age out
//!   (`expire_at`) and retire after a configured number of combines
//!   (`join_count`); both transitions are observed lazily during ingest
//!   sweeps and drop the part in place.
//! - [`combine`]: the strategies. `join` lays non-key fields side by
//!   side; `merge` unions fields, surfacing conflicts as `[stored,
//!   inbound]` pairs.
//!
//! ## Eviction
//!
//! A background loop ticks every second. While the store holds no more
//! blocks than `block_count_soft_limit`, nothing is evicted regardless of
//! age, which keeps recent state hot under low load. Above the limit,
//! blocks whose window lapsed are popped oldest-first until the limit is
//! reached or the heap head is still in the future.
//!
//! ## Concurrency
//!
//! One store-wide lock. All combine callbacks are serialized per store
//! instance; throughput-sensitive callers shard by key across multiple
//! stores.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod block;
pub mod combine;
pub mod errors;
pub mod logging;
pub mod store;

// Re-export main types
pub use block::{Block, BlockPart, PartsBySource};
pub use combine::{join_combine, merge_combine, CombineFn};
pub use errors::WindowError;
pub use store::{BlockStore, BlockStoreConfig};
