//! Dynamic event payload type.
//!
//! Events flowing through the runtime are schema-less JSON objects. The
//! `Data` alias is the canonical in-memory form; every subsystem that
//! inspects or produces event fields works against it.

use serde_json::Map;

/// Re-export of the JSON value type used for individual fields.
pub use serde_json::Value;

/// A schema-less event payload: an ordered map of field name to JSON value.
pub type Data = Map<String, Value>;

/// Builds a `Data` payload from `(name, value)` pairs.
///
/// Convenience for tests and adapters that assemble small payloads by hand.
pub fn data_from_pairs<I, K>(pairs: I) -> Data
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Formats a field value the way composite keys and log lines expect.
///
/// Strings render without surrounding quotes; everything else uses its
/// JSON representation.
pub fn format_field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
