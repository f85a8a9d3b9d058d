//! Route configuration and registry.
//!
//! A routing document is a YAML file with a `messageConfig.routes`
//! sequence. The registry indexes routes two ways (by selector and by
//! subject) and resolves wildcard selectors of the `prefix/*` form.
//!
//! Wildcard resolution is deliberately ambiguity-rejecting: there is no
//! specificity ordering between overlapping wildcard selectors. Authors
//! keep selectors disjoint; two candidates for one query is a
//! configuration error, not a tie to break silently.

use crate::errors::ConfigError;
use crate::{DEFAULT_ROUTING_FILE, ROUTING_FILE_ENV};
use serde::{Deserialize, Serialize};
use shared_types::env::string_from_env_with_default;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Delivery mode of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    /// Server-pushed delivery (default).
    Push,
    /// Batched pull delivery driven by a background fetcher.
    Pull,
}

/// One route: a symbolic selector bound to a broker destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Symbolic route name; unique; may end in `/*` for prefix matching.
    pub selector: String,

    /// Stream name. Together with `queue` this selects a durable consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Queue group (durable consumer name in pull mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Concrete broker subject.
    pub subject: String,

    /// Broker URL.
    pub url: String,

    /// Maximum unacknowledged messages for a durable consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ack_pending: Option<usize>,

    /// Redelivery window for unacknowledged messages, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_wait: Option<u64>,

    /// Delivery mode; absent means push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RouteMode>,

    /// Fetch batch size in pull mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl RouteConfig {
    /// A route is durable when both the stream name and the queue group
    /// are configured; everything else is best-effort pub/sub.
    pub fn durable(&self) -> bool {
        self.name.is_some() && self.queue.is_some()
    }

    /// Effective delivery mode.
    pub fn mode(&self) -> RouteMode {
        self.mode.unwrap_or(RouteMode::Push)
    }

    /// Ack wait as a duration, when configured.
    pub fn ack_wait(&self) -> Option<Duration> {
        self.ack_wait.map(Duration::from_secs)
    }
}

impl std::fmt::Display for RouteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "selector: {}, name: {:?}, queue: {:?}, subject: {}, url: {}",
            self.selector, self.name, self.queue, self.subject, self.url
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageConfig {
    routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingDocument {
    message_config: MessageConfig,
}

/// Immutable route lookup built once from a routing document.
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    routes: Vec<RouteConfig>,
    by_selector: HashMap<String, usize>,
    by_subject: HashMap<String, usize>,
}

impl RouteRegistry {
    /// Builds a registry from an in-memory route list.
    pub fn from_routes(routes: Vec<RouteConfig>) -> Self {
        let mut by_selector = HashMap::new();
        let mut by_subject = HashMap::new();
        for (i, route) in routes.iter().enumerate() {
            by_selector.insert(route.selector.clone(), i);
            by_subject.insert(route.subject.clone(), i);
        }
        Self {
            routes,
            by_selector,
            by_subject,
        }
    }

    /// Parses a routing document from YAML text.
    pub fn load_str(yaml: &str) -> Result<Self, ConfigError> {
        let document: RoutingDocument = serde_yaml::from_str(yaml)?;
        Ok(Self::from_routes(document.message_config.routes))
    }

    /// Reads and parses a routing document from disk.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::load_str(&yaml)
    }

    /// Loads the routing document named by `ROUTING_FILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = string_from_env_with_default(ROUTING_FILE_ENV, DEFAULT_ROUTING_FILE);
        Self::load_file(path)
    }

    /// All routes in document order.
    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    /// Exact selector lookup.
    pub fn find_by_selector(&self, selector: &str) -> Result<&RouteConfig, ConfigError> {
        self.by_selector
            .get(selector)
            .map(|&i| &self.routes[i])
            .ok_or_else(|| ConfigError::SelectorNotFound {
                selector: selector.to_string(),
            })
    }

    /// Selector lookup with wildcard fallback.
    ///
    /// An exact match wins outright. Otherwise every selector ending in
    /// `/*` whose prefix starts `selector` is a candidate: exactly one
    /// candidate resolves, zero is [`ConfigError::SelectorNotFound`], two
    /// or more is [`ConfigError::AmbiguousSelector`].
    pub fn find_by_selector_wildcard(&self, selector: &str) -> Result<&RouteConfig, ConfigError> {
        if let Ok(route) = self.find_by_selector(selector) {
            return Ok(route);
        }

        let mut matches: Vec<&str> = Vec::new();
        for key in self.by_selector.keys() {
            if let Some(prefix) = key.strip_suffix("/*") {
                if selector.starts_with(prefix) {
                    matches.push(key.as_str());
                }
            }
        }

        match matches.as_slice() {
            [only] => Ok(&self.routes[self.by_selector[*only]]),
            [] => Err(ConfigError::SelectorNotFound {
                selector: selector.to_string(),
            }),
            _ => {
                matches.sort_unstable();
                Err(ConfigError::AmbiguousSelector {
                    selector: selector.to_string(),
                    matches: matches.iter().map(|s| s.to_string()).collect(),
                })
            }
        }
    }

    /// Exact subject lookup.
    pub fn find_by_subject(&self, subject: &str) -> Result<&RouteConfig, ConfigError> {
        self.by_subject
            .get(subject)
            .map(|&i| &self.routes[i])
            .ok_or_else(|| ConfigError::SubjectNotFound {
                subject: subject.to_string(),
            })
    }
}
