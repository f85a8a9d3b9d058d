//! Per-method cache behavior.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Custom key builder for methods whose default JSON-hash key is not
/// appropriate (e.g. when some arguments must not affect the key).
pub type KeyBuilderFn = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

/// Caching behavior of one backend method.
#[derive(Clone)]
pub struct MethodConfig {
    /// TTL for this method's entries. Zero selects the backend default.
    pub ttl: Duration,
    /// When false the method bypasses the cache entirely.
    pub cacheable: bool,
    /// Optional custom key builder.
    pub key_builder: Option<KeyBuilderFn>,
}

impl MethodConfig {
    /// Cacheable config with an explicit TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            cacheable: true,
            key_builder: None,
        }
    }

    /// Config that disables caching for the method.
    pub fn not_cacheable() -> Self {
        Self {
            ttl: Duration::ZERO,
            cacheable: false,
            key_builder: None,
        }
    }
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::ZERO,
            cacheable: true,
            key_builder: None,
        }
    }
}

impl std::fmt::Debug for MethodConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodConfig")
            .field("ttl", &self.ttl)
            .field("cacheable", &self.cacheable)
            .field("key_builder", &self.key_builder.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Bulk TTL configuration applied to a cached backend at construction.
///
/// Concrete backends declare a base TTL plus per-method overrides for
/// reads whose data changes at a different cadence.
#[derive(Debug, Clone)]
pub struct MethodTtlConfig {
    default_ttl: Duration,
    overrides: HashMap<String, Duration>,
}

impl MethodTtlConfig {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            overrides: HashMap::new(),
        }
    }

    /// Sets the TTL override for one method.
    pub fn set_method_ttl(&mut self, method: impl Into<String>, ttl: Duration) -> &mut Self {
        self.overrides.insert(method.into(), ttl);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// TTL for `method`: the override when present, else the base TTL.
    pub fn ttl_for(&self, method: &str) -> Duration {
        self.overrides
            .get(method)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.overrides.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
