//! Composite-key field definitions.
//!
//! A correlation key is assembled from one or more named event fields.
//! `KeyDefinition` describes one such field; the windowed store takes an
//! ordered list of them.

use serde::{Deserialize, Serialize};

/// One field of a composite correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    /// Field name looked up in the event payload.
    pub name: String,

    /// Optional alias used when projecting the field into outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Whether the field must be present. Defaults to false.
    #[serde(default)]
    pub required: bool,
}

impl KeyDefinition {
    /// Creates a definition for a required field with no alias.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            required: true,
        }
    }
}

/// Renders the field names of an ordered definition list, comma separated.
pub fn format_key_names(defs: &[KeyDefinition]) -> String {
    defs.iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
