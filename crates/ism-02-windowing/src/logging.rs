//! Block-store log lines.
//!
//! One line per significant transition: store created, block created,
//! part added, parts skipped, combine completed, block evicted, store
//! shutdown. The message texts are stable; downstream tooling greps them.

use crate::block::Block;
use shared_types::data::format_field_value;
use shared_types::key_definition::format_key_names;
use shared_types::{Data, KeyDefinition, Statistics};
use std::time::Duration;
use tracing::info;

/// Renders `name=value` pairs for the key fields of a payload.
pub fn format_key_values(key_defs: &[KeyDefinition], data: &Data) -> String {
    key_defs
        .iter()
        .map(|def| match data.get(&def.name) {
            Some(value) => format!("{}={}", def.name, format_field_value(value)),
            None => format!("{}=<missing>", def.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn log_store_created(
    key_defs: &[KeyDefinition],
    soft_limit: usize,
    max_join_count: u32,
    window_ttl: Duration,
    part_max_age: Duration,
) {
    info!(
        keys = %format_key_names(key_defs),
        block_count_soft_limit = soft_limit,
        block_window_ttl = ?window_ttl,
        part_max_join_count = max_join_count,
        part_max_age = ?part_max_age,
        "block store created"
    );
}

pub(crate) fn log_block_created(
    key: &str,
    window_ttl: Duration,
    total_blocks: usize,
    soft_limit: usize,
) {
    info!(
        key,
        block_window_ttl = ?window_ttl,
        total_blocks,
        soft_limit,
        "new block created"
    );
}

pub(crate) fn log_part_added(
    key: &str,
    source_id: &str,
    existing_parts: usize,
    total_sources: usize,
    part_max_age: Duration,
) {
    info!(
        key,
        source = source_id,
        existing_parts,
        total_sources,
        part_max_age = ?part_max_age,
        "new part added"
    );
}

pub(crate) fn log_parts_skipped(
    key: &str,
    source_id: &str,
    skipped_expired: usize,
    skipped_max_joins: usize,
    kept: usize,
    part_max_age: Duration,
    max_join_count: u32,
) {
    info!(
        key,
        source = source_id,
        skipped_expired,
        part_max_age = ?part_max_age,
        skipped_max_joins,
        max_join_count,
        kept,
        "parts skipped"
    );
}

pub(crate) fn log_combine_completed(
    key: &str,
    key_defs: &[KeyDefinition],
    result: &Data,
    stored_source: &str,
    inbound_source: &str,
    stored_join_count: u32,
    inbound_join_count: u32,
    max_join_count: u32,
    avg_duration: Duration,
) {
    info!(
        key,
        key_values = %format_key_values(key_defs, result),
        sources = %format!("{stored_source}+{inbound_source}"),
        stored_join_count,
        inbound_join_count,
        max_join_count,
        avg_duration = ?avg_duration,
        "combine completed"
    );
}

pub(crate) fn log_block_evicted(block: &Block, current_blocks: usize, soft_limit: usize) {
    info!(
        key = %block.key,
        sources = block.source_count(),
        parts = block.part_count(),
        remaining_blocks = current_blocks,
        soft_limit,
        "block evicted"
    );
}

pub(crate) fn log_store_shutdown(
    key_defs: &[KeyDefinition],
    block_count: usize,
    total_parts: usize,
    unique_sources: usize,
    stats: &Statistics,
) {
    info!(
        keys = %format_key_names(key_defs),
        active_blocks = block_count,
        total_parts,
        unique_sources,
        stats = %stats,
        "block store shutting down"
    );
}
