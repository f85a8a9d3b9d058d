//! Environment-backed configuration helpers.
//!
//! All environment lookups in the runtime go through these functions so
//! tests can override values and defaults live in one place.

use std::env;
use std::time::Duration;

/// Returns the value of `key`, or `default` when unset.
pub fn string_from_env_with_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Returns `key` parsed as an i64, or `default` when unset or unparsable.
pub fn i64_from_env_with_default(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Returns `key` parsed as a duration, or `default` when unset or unparsable.
///
/// Accepted forms: a bare integer (seconds), or an integer with an
/// `ms`, `s`, or `m` suffix, e.g. `500ms`, `10s`, `5m`.
pub fn duration_from_env_with_default(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| parse_duration(&v))
        .unwrap_or(default)
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60));
    }
    None
}
