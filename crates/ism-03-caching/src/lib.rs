//! # Caching Subsystem - TTL Cache and Cache-Aside Backend Wrapper
//!
//! Two layers, composable but independently useful:
//!
//! - [`LocalCache`]: a process-local TTL cache. A map provides O(1)
//!   lookups; a min-heap ordered by eviction time lets a background
//!   cleanup loop evict expired entries without scanning. Entries track
//!   their heap position so an update re-heapifies in O(log n).
//! - [`CachedBackend`]: a generic cache-aside wrapper for any backend
//!   exposing read methods. Reads memoize under deterministic keys with
//!   per-method TTLs; writes invalidate exactly, per method, or by
//!   argument prefix via a key registry.
//!
//! The cache is process-local by design. Nothing here coordinates across
//! instances; a distributed deployment swaps the [`Cache`] implementation
//! at the trait seam.
//!
//! ## Key construction
//!
//! `method + ":" + hex(sha256(json({method, args}))[0..8])`. Keys are also
//! registered under `"method:first_arg"` so a write touching one entity
//! can evict every cached variation of a read for that entity without
//! scanning the cache.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cache;
pub mod cached_backend;
pub mod entry;
pub mod local_cache;
pub mod method_config;

// Re-export main types
pub use cache::{Cache, CacheError, CacheValue, FetchFn};
pub use cached_backend::{call_cached, call_cached_with_ttl, CachedBackend, MethodFn};
pub use local_cache::{LocalCache, LocalCacheOptions};
pub use method_config::{MethodConfig, MethodTtlConfig};

use std::time::Duration;

/// Default entry TTL when a cache is built without one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default cadence of the background cleanup loop.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
