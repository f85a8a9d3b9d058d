//! Windowing error types.

use thiserror::Error;

/// Errors from block-store operations.
#[derive(Debug, Error)]
pub enum WindowError {
    /// The event is missing a field required by the composite key.
    /// The event is rejected and nothing is mutated.
    #[error("field `{field}` not present in event")]
    MissingKeyField { field: String },

    /// The combine strategy failed. State mutated before the failure is
    /// kept (at-least-once downstream).
    #[error("combine error: {0}")]
    Combine(String),

    /// The downstream callback rejected a combined output. As with
    /// combine failures, prior mutations are kept.
    #[error("could not process combined part: {0}")]
    Callback(String),

    /// The store was shut down; no further ingests are accepted.
    #[error("block store is shut down")]
    ShutDown,
}
