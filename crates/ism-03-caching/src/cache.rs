//! Cache port.
//!
//! The abstraction consumed by the cached backend wrapper and the
//! transport's subject demultiplexer. Swapping the implementation (local
//! memory, remote store) must not change consuming code.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A cached value. Values are type-erased; typed callers downcast at the
/// edge and fall back to a fresh fetch when the stored type is wrong.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Fetch callback for [`Cache::get_or_create`].
///
/// Receives whether an entry currently exists and the previous value when
/// it does (an expired entry still surfaces its stale value here).
/// Returning `Ok(None)` means "nothing to cache"; the miss is returned to
/// the caller and the cache is left untouched.
pub type FetchFn<'a> =
    &'a mut dyn FnMut(bool, Option<&CacheValue>) -> Result<Option<CacheValue>, CacheError>;

/// Errors surfaced by cache operations and the cached backend wrapper.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The wrapped backend failed while producing a value.
    #[error("backend error: {0}")]
    Backend(String),

    /// A name-dispatched method was never registered.
    #[error("method not registered: {0}")]
    MethodNotRegistered(String),

    /// Cache-key construction failed to serialize the arguments.
    #[error("failed to build cache key: {0}")]
    KeyEncoding(String),
}

/// Cache interface.
///
/// All operations are synchronous; implementations guard internal state
/// with their own locks and must be safe to share across threads.
pub trait Cache: Send + Sync {
    /// Returns the value for `key` if present and not expired.
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Stores `value` under `key`. A zero `ttl` selects the default TTL.
    fn set(&self, key: &str, value: CacheValue, ttl: Duration);

    /// Returns the cached value or creates it via `fetch`.
    ///
    /// Implementations must be single-flight per key: under concurrent
    /// misses for the same key, `fetch` runs at most once and the other
    /// callers observe its result.
    fn get_or_create(
        &self,
        key: &str,
        fetch: FetchFn<'_>,
        ttl: Duration,
    ) -> Result<Option<CacheValue>, CacheError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str);

    /// Removes every entry whose key starts with `prefix`.
    fn delete_by_prefix(&self, prefix: &str);

    /// Removes all entries.
    fn clear(&self);

    /// The TTL applied when callers pass zero.
    fn default_ttl(&self) -> Duration;

    /// Number of entries currently stored, expired or not.
    fn len(&self) -> usize;

    /// Returns true when the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops background maintenance. The cache remains usable afterwards
    /// but expired entries are only dropped lazily on access.
    fn close(&self);
}
