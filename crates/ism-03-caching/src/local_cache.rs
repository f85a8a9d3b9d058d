//! In-memory TTL cache.
//!
//! A read/write lock guards the entry store. A background cleanup thread
//! ticks at a configurable interval, peeks the eviction heap under the
//! read lock and, only when the head has expired, takes the write lock
//! and pops every expired head. `close` stops the thread; the cache keeps
//! working afterwards minus automatic eviction.

use crate::cache::{Cache, CacheError, CacheValue, FetchFn};
use crate::entry::EntryStore;
use crate::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_TTL};
use parking_lot::{Mutex, RwLock};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Construction options for [`LocalCache`].
#[derive(Debug, Clone)]
pub struct LocalCacheOptions {
    /// TTL applied when a caller passes zero.
    pub default_ttl: Duration,
    /// Cadence of the background cleanup loop.
    pub cleanup_interval: Duration,
}

impl Default for LocalCacheOptions {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

struct Shared {
    store: RwLock<EntryStore>,
    default_ttl: Duration,
}

/// Process-local TTL cache with heap-ordered eviction.
pub struct LocalCache {
    shared: Arc<Shared>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl LocalCache {
    /// Creates a cache with default TTL and cleanup interval and starts
    /// the cleanup loop. Call [`Cache::close`] when done with the cache.
    pub fn new() -> Self {
        Self::with_options(LocalCacheOptions::default())
    }

    /// Creates a cache with explicit options and starts the cleanup loop.
    pub fn with_options(options: LocalCacheOptions) -> Self {
        let shared = Arc::new(Shared {
            store: RwLock::new(EntryStore::new()),
            default_ttl: options.default_ttl,
        });

        let (stop_tx, stop_rx) = mpsc::channel();
        let loop_shared = Arc::clone(&shared);
        let interval = options.cleanup_interval;
        std::thread::spawn(move || cleanup_loop(&loop_shared, interval, &stop_rx));

        Self {
            shared,
            stop_tx: Mutex::new(Some(stop_tx)),
        }
    }

    fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() {
            self.shared.default_ttl
        } else {
            ttl
        }
    }

    /// Number of heap slots, for tests asserting eviction drained fully.
    pub fn heap_len(&self) -> usize {
        self.shared.store.read().heap_len()
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for LocalCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        let store = self.shared.store.read();
        let entry = store.items.get(key)?;
        // Expired entries may linger until the next cleanup tick but are
        // never returned.
        if Instant::now() >= entry.evict_at {
            return None;
        }
        Some(Arc::clone(&entry.value))
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Duration) {
        let evict_at = Instant::now() + self.effective_ttl(ttl);
        self.shared.store.write().upsert(key, value, evict_at);
    }

    fn get_or_create(
        &self,
        key: &str,
        fetch: FetchFn<'_>,
        ttl: Duration,
    ) -> Result<Option<CacheValue>, CacheError> {
        // Fast path under the read lock.
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }

        let mut store = self.shared.store.write();
        let now = Instant::now();

        // Double-check: another caller may have populated the entry while
        // the read lock was released.
        let (exists, previous) = match store.items.get(key) {
            Some(entry) if now < entry.evict_at => {
                return Ok(Some(Arc::clone(&entry.value)));
            }
            Some(entry) => (true, Some(Arc::clone(&entry.value))),
            None => (false, None),
        };

        // Single-flight: the fetch runs under the write lock, so at most
        // one caller produces the value per miss.
        let fetched = fetch(exists, previous.as_ref())?;
        let Some(value) = fetched else {
            return Ok(None); // empty fetch results are not cached
        };

        let evict_at = Instant::now() + self.effective_ttl(ttl);
        store.upsert(key, Arc::clone(&value), evict_at);
        Ok(Some(value))
    }

    fn delete(&self, key: &str) {
        self.shared.store.write().remove(key);
    }

    fn delete_by_prefix(&self, prefix: &str) {
        let mut store = self.shared.store.write();
        let keys: Vec<String> = store
            .items
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            store.remove(key);
        }
        debug!(prefix, removed = keys.len(), "cache prefix delete");
    }

    fn clear(&self) {
        self.shared.store.write().clear();
    }

    fn default_ttl(&self) -> Duration {
        self.shared.default_ttl
    }

    fn len(&self) -> usize {
        self.shared.store.read().len()
    }

    fn close(&self) {
        // Dropping the sender disconnects the cleanup loop's receiver.
        self.stop_tx.lock().take();
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.close();
    }
}

fn cleanup_loop(shared: &Shared, interval: Duration, stop_rx: &mpsc::Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => evict_expired(shared),
            // Sender dropped or explicit stop: exit.
            _ => return,
        }
    }
}

fn evict_expired(shared: &Shared) {
    let now = Instant::now();

    // Peek under the read lock; skip the write lock when nothing expired.
    {
        let store = shared.store.read();
        match store.peek() {
            Some(head) if head.evict_at <= now => {}
            _ => return,
        }
    }

    let mut store = shared.store.write();
    let mut evicted = 0usize;
    while store.pop_expired(now).is_some() {
        evicted += 1;
    }
    trace!(evicted, remaining = store.len(), "cache cleanup tick");
}
