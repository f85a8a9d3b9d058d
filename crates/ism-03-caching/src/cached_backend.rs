//! Generic cache-aside wrapper.
//!
//! Wraps any backend exposing read methods: reads memoize their results
//! under deterministic keys, writes invalidate. Two call shapes are
//! supported:
//!
//! - the typed path: [`call_cached`] / [`call_cached_with_ttl`] take the
//!   concrete fetch closure and return the concrete type;
//! - the name-dispatched path: methods registered once as closures via
//!   [`CachedBackend::register_method`] and invoked through
//!   [`CachedBackend::execute`]. This replaces runtime reflection while
//!   keeping the call-by-method-name shape.
//!
//! Every key built for a method call is also registered under
//! `"method:first_arg"`, which is what makes
//! [`CachedBackend::invalidate_method_prefix`] precise without scanning
//! the cache.

use crate::cache::{Cache, CacheError, CacheValue};
use crate::local_cache::LocalCache;
use crate::method_config::{MethodConfig, MethodTtlConfig};
use crate::DEFAULT_TTL;
use parking_lot::RwLock;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A registered backend method: takes the call arguments, returns the
/// type-erased result. `Ok(None)` means "no result; do not cache".
pub type MethodFn = Arc<dyn Fn(&[Value]) -> Result<Option<CacheValue>, CacheError> + Send + Sync>;

/// Cache-aside wrapper around an arbitrary backend.
pub struct CachedBackend {
    cache: Arc<dyn Cache>,
    default_ttl: Duration,
    methods: RwLock<HashMap<String, MethodFn>>,
    method_configs: RwLock<HashMap<String, MethodConfig>>,
    key_registry: RwLock<HashMap<String, HashSet<String>>>,
}

impl CachedBackend {
    /// Creates a wrapper over `cache`. Passing `None` builds a local
    /// in-memory cache; a zero `default_ttl` selects the crate default.
    pub fn new(cache: Option<Arc<dyn Cache>>, default_ttl: Duration) -> Self {
        let cache = cache.unwrap_or_else(|| Arc::new(LocalCache::new()) as Arc<dyn Cache>);
        let default_ttl = if default_ttl.is_zero() {
            DEFAULT_TTL
        } else {
            default_ttl
        };

        Self {
            cache,
            default_ttl,
            methods: RwLock::new(HashMap::new()),
            method_configs: RwLock::new(HashMap::new()),
            key_registry: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a wrapper and applies a bulk TTL configuration.
    pub fn with_ttl_config(cache: Option<Arc<dyn Cache>>, config: &MethodTtlConfig) -> Self {
        let backend = Self::new(cache, config.default_ttl());
        for (method, ttl) in config.overrides() {
            backend.set_method_config(method, MethodConfig::with_ttl(ttl));
        }
        backend
    }

    /// The wrapped cache.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// The TTL applied to methods without an override.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Builds the deterministic cache key for a method call and records
    /// it in the prefix registry.
    ///
    /// Key shape: `method:hex(sha256(json({method, args}))[0..8])`.
    pub fn build_cache_key(&self, method: &str, args: &[Value]) -> Result<String, CacheError> {
        let key_data = json!({ "method": method, "args": args });
        let encoded =
            serde_json::to_vec(&key_data).map_err(|e| CacheError::KeyEncoding(e.to_string()))?;

        let digest = Sha256::digest(&encoded);
        let cache_key = format!("{}:{}", method, hex::encode(&digest[..8]));

        if let Some(first) = args.first() {
            let registry_key = format!("{}:{}", method, format_arg(first));
            self.key_registry
                .write()
                .entry(registry_key)
                .or_default()
                .insert(cache_key.clone());
        }

        Ok(cache_key)
    }

    /// Cache-aside read under the default TTL.
    pub fn get_cached(
        &self,
        cache_key: &str,
        fetch: &mut dyn FnMut() -> Result<Option<CacheValue>, CacheError>,
    ) -> Result<Option<CacheValue>, CacheError> {
        self.get_cached_with_ttl(cache_key, self.default_ttl, fetch)
    }

    /// Cache-aside read under an explicit TTL.
    pub fn get_cached_with_ttl(
        &self,
        cache_key: &str,
        ttl: Duration,
        fetch: &mut dyn FnMut() -> Result<Option<CacheValue>, CacheError>,
    ) -> Result<Option<CacheValue>, CacheError> {
        self.cache
            .get_or_create(cache_key, &mut |_exists, _prev| fetch(), ttl)
    }

    /// Removes exact cache keys. The sentinel `"*"` clears the cache.
    pub fn invalidate_cache(&self, patterns: &[&str]) {
        for pattern in patterns {
            if *pattern == "*" {
                self.cache.clear();
                self.key_registry.write().clear();
                return;
            }
            self.cache.delete(pattern);
        }
    }

    /// Invalidates the entry for one exact method call. Idempotent.
    pub fn invalidate_method(&self, method: &str, args: &[Value]) -> Result<(), CacheError> {
        let cache_key = self.build_cache_key(method, args)?;
        self.cache.delete(&cache_key);
        debug!(method, key = %cache_key, "cache invalidated");
        Ok(())
    }

    /// Invalidates every registered entry for `method` whose first
    /// argument equals `prefix_args[0]`, then clears that registry slot.
    ///
    /// With no prefix args, every entry for the method is dropped via a
    /// raw prefix delete on the cache.
    pub fn invalidate_method_prefix(&self, method: &str, prefix_args: &[Value]) {
        let Some(first) = prefix_args.first() else {
            self.cache.delete_by_prefix(&format!("{method}:"));
            return;
        };

        let registry_key = format!("{}:{}", method, format_arg(first));
        let keys = self.key_registry.write().remove(&registry_key);
        let Some(keys) = keys else {
            return;
        };

        for key in &keys {
            self.cache.delete(key);
        }
        debug!(
            method,
            prefix = %format_arg(first),
            removed = keys.len(),
            "cache prefix invalidated"
        );
    }

    /// Registers a method closure for name-based dispatch, with optional
    /// per-method configuration.
    pub fn register_method(&self, name: impl Into<String>, method: MethodFn, config: Option<MethodConfig>) {
        let name = name.into();
        if let Some(config) = config {
            self.method_configs.write().insert(name.clone(), config);
        }
        self.methods.write().insert(name, method);
    }

    /// Registers several method closures at once.
    pub fn register_methods(&self, methods: impl IntoIterator<Item = (String, MethodFn)>) {
        let mut map = self.methods.write();
        for (name, method) in methods {
            map.insert(name, method);
        }
    }

    /// Sets or replaces the configuration for one method.
    pub fn set_method_config(&self, name: impl Into<String>, config: MethodConfig) {
        self.method_configs.write().insert(name.into(), config);
    }

    /// The configuration for `name`, when one was set.
    pub fn method_config(&self, name: &str) -> Option<MethodConfig> {
        self.method_configs.read().get(name).cloned()
    }

    /// Runs a registered method by name through the cache-aside path.
    ///
    /// Honors the method's configuration: non-cacheable methods run
    /// directly; a zero configured TTL selects the default.
    pub fn execute(&self, method: &str, args: &[Value]) -> Result<Option<CacheValue>, CacheError> {
        let func = self
            .methods
            .read()
            .get(method)
            .cloned()
            .ok_or_else(|| CacheError::MethodNotRegistered(method.to_string()))?;

        let config = self.method_config(method);
        if let Some(config) = &config {
            if !config.cacheable {
                return func(args);
            }
        }

        let ttl = self.effective_ttl(config.as_ref());
        let cache_key = match self.build_key_for(method, args, config.as_ref()) {
            Ok(key) => key,
            // Key construction failure bypasses the cache, not the call.
            Err(_) => return func(args),
        };

        self.get_cached_with_ttl(&cache_key, ttl, &mut || func(args))
    }

    fn effective_ttl(&self, config: Option<&MethodConfig>) -> Duration {
        match config {
            Some(c) if !c.ttl.is_zero() => c.ttl,
            _ => self.default_ttl,
        }
    }

    fn build_key_for(
        &self,
        method: &str,
        args: &[Value],
        config: Option<&MethodConfig>,
    ) -> Result<String, CacheError> {
        if let Some(builder) = config.and_then(|c| c.key_builder.as_ref()) {
            return Ok(builder(args));
        }
        self.build_cache_key(method, args)
    }
}

/// Renders an argument the way registry keys expect: strings bare,
/// everything else as JSON.
fn format_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Typed cache-aside call using the method's configured TTL (or the
/// backend default).
///
/// On a cache hit of the wrong stored type the cache is bypassed and the
/// fetch runs directly; the bad entry is left for TTL eviction.
pub fn call_cached<T, E, F>(
    backend: &CachedBackend,
    method: &str,
    args: &[Value],
    fetch: F,
) -> Result<T, E>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Result<T, E>,
{
    let config = backend.method_config(method);
    if let Some(config) = &config {
        if !config.cacheable {
            return fetch();
        }
    }
    let ttl = backend.effective_ttl(config.as_ref());
    call_cached_with_ttl(backend, method, args, ttl, fetch)
}

/// Typed cache-aside call with an explicit TTL.
pub fn call_cached_with_ttl<T, E, F>(
    backend: &CachedBackend,
    method: &str,
    args: &[Value],
    ttl: Duration,
    fetch: F,
) -> Result<T, E>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Result<T, E>,
{
    let cache_key = match backend.build_cache_key(method, args) {
        Ok(key) => key,
        // Key construction failure bypasses the cache, not the call.
        Err(_) => return fetch(),
    };

    let mut fetch_slot = Some(fetch);
    let mut fetch_error: Option<E> = None;

    let cached = backend.get_cached_with_ttl(&cache_key, ttl, &mut || {
        let Some(fetch) = fetch_slot.take() else {
            return Ok(None);
        };
        match fetch() {
            Ok(value) => Ok(Some(Arc::new(value) as CacheValue)),
            Err(e) => {
                fetch_error = Some(e);
                Err(CacheError::Backend("fetch failed".to_string()))
            }
        }
    });

    if let Some(e) = fetch_error {
        return Err(e);
    }

    match cached {
        Ok(Some(value)) => match value.downcast::<T>() {
            // Stored type mismatch falls back to a direct fetch; the bad
            // entry is left for TTL eviction.
            Ok(typed) => Ok((*typed).clone()),
            Err(_) => match fetch_slot.take() {
                Some(fetch) => fetch(),
                None => unreachable!("fetched value stored with the wrong type"),
            },
        },
        _ => match fetch_slot.take() {
            Some(fetch) => fetch(),
            None => unreachable!("cache dropped a fetched value"),
        },
    }
}
