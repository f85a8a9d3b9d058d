//! Routing and transport error types.

use thiserror::Error;

/// Errors from registry loading and lookups.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No route matched the selector (including the wildcard search).
    #[error("route not found by selector {selector}")]
    SelectorNotFound { selector: String },

    /// No route matched the subject.
    #[error("route not found by subject {subject}")]
    SubjectNotFound { subject: String },

    /// Two or more wildcard selectors matched; selectors must be disjoint.
    #[error("multiple routes found for wildcard selector {selector}: {matches:?}")]
    AmbiguousSelector {
        selector: String,
        matches: Vec<String>,
    },

    /// The routing document could not be read.
    #[error("failed to read routing config: {0}")]
    Io(#[from] std::io::Error),

    /// The routing document could not be parsed.
    #[error("failed to parse routing config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Errors from transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Broker connection failed. Not retried internally.
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    /// The operation requires a connection that does not exist.
    #[error("not connected to broker")]
    NotConnected,

    /// The operation requires an active subscription.
    #[error("not subscribed")]
    NotSubscribed,

    /// Publish was rejected or the broker is gone.
    #[error("failed to publish message: {0}")]
    Publish(String),

    /// Payload serialization failed before any I/O.
    #[error("failed to serialize message: {0}")]
    Encode(String),

    /// A request or fetch exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Canceled,

    /// The message payload is empty.
    #[error("message is empty")]
    EmptyMessage,

    /// Payload bytes are not valid for the requested view.
    #[error("failed to decode message: {0}")]
    Decode(String),
}
