//! Combine strategies.
//!
//! A combine takes one stored part and one inbound part from different
//! sources and produces a downstream payload. Strategies are plain
//! values owned by the store; every semantic input (source ids, both
//! parts, the key definitions) is an explicit argument.
//!
//! Both shipped strategies increment both parts' `join_count` exactly
//! once per invocation; the store relies on that to retire parts at
//! their combine budget.

use crate::block::BlockPart;
use crate::errors::WindowError;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use shared_types::{Data, KeyDefinition};
use std::sync::Arc;

/// Pluggable combine function.
pub type CombineFn = Arc<
    dyn Fn(
            &str,
            &mut BlockPart,
            &str,
            &mut BlockPart,
            &[KeyDefinition],
        ) -> Result<Data, WindowError>
        + Send
        + Sync,
>;

fn is_key_field(key_defs: &[KeyDefinition], field: &str) -> bool {
    key_defs.iter().any(|def| def.name == field)
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Join: key fields once, non-key fields from both sources side by side.
///
/// Key fields are taken from the stored part; by construction both parts
/// agree on them. Adds a `joinedAt` timestamp.
pub fn join_combine(
    _stored_source: &str,
    stored: &mut BlockPart,
    _inbound_source: &str,
    inbound: &mut BlockPart,
    key_defs: &[KeyDefinition],
) -> Result<Data, WindowError> {
    let mut result = Data::new();

    for def in key_defs {
        if let Some(value) = stored.payload.get(&def.name) {
            result.insert(def.name.clone(), value.clone());
        }
    }

    for part in [&*stored, &*inbound] {
        for (field, value) in &part.payload {
            if is_key_field(key_defs, field) {
                continue;
            }
            result.insert(field.clone(), value.clone());
        }
    }

    result.insert("joinedAt".to_string(), timestamp());
    stored.join_count += 1;
    inbound.join_count += 1;
    Ok(result)
}

/// Merge: all fields from both sources. A non-key field present in both
/// with different values becomes the two-element sequence
/// `[stored, inbound]`. Adds a `mergedAt` timestamp.
pub fn merge_combine(
    _stored_source: &str,
    stored: &mut BlockPart,
    _inbound_source: &str,
    inbound: &mut BlockPart,
    _key_defs: &[KeyDefinition],
) -> Result<Data, WindowError> {
    let mut result = Data::new();

    for (field, value) in &stored.payload {
        match inbound.payload.get(field) {
            Some(other) if other != value => {
                result.insert(
                    field.clone(),
                    Value::Array(vec![value.clone(), other.clone()]),
                );
            }
            _ => {
                result.insert(field.clone(), value.clone());
            }
        }
    }

    for (field, value) in &inbound.payload {
        if !stored.payload.contains_key(field) {
            result.insert(field.clone(), value.clone());
        }
    }

    result.insert("mergedAt".to_string(), timestamp());
    stored.join_count += 1;
    inbound.join_count += 1;
    Ok(result)
}
