//! Correlation cells.
//!
//! A [`Block`] is one correlation cell for one composite key, holding the
//! events that arrived for that key grouped by source. Each event is
//! wrapped in a [`BlockPart`] tracking its absolute expiry and how many
//! times it has been combined.

use shared_types::Data;
use std::collections::HashMap;
use std::time::Instant;

/// One inbound event wrapped with TTL tracking and a combine counter.
#[derive(Debug, Clone)]
pub struct BlockPart {
    /// The raw event payload.
    pub payload: Data,
    /// Absolute expiry; the part is skipped and dropped after this time.
    pub expire_at: Instant,
    /// How many times this part has been combined with a peer.
    pub join_count: u32,
}

impl BlockPart {
    /// Wraps an event with a fresh counter and the given expiry.
    pub fn new(payload: Data, expire_at: Instant) -> Self {
        Self {
            payload,
            expire_at,
            join_count: 0,
        }
    }

    /// Whether the part has aged out at `now`.
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.expire_at
    }

    /// Whether the part has reached its combine budget.
    pub fn max_joins_reached(&self, max_join_count: u32) -> bool {
        self.join_count >= max_join_count
    }
}

/// Parts grouped by source, in per-source insertion order.
pub type PartsBySource = HashMap<String, Vec<BlockPart>>;

/// One correlation cell for one composite key.
#[derive(Debug)]
pub struct Block {
    /// The composite key this block correlates.
    pub key: String,
    /// Arrived events grouped by source id.
    pub parts_by_source: PartsBySource,
    /// Sliding-window expiry; refreshed on every event landing here.
    pub eviction_time: Instant,
    /// Position in the store's eviction heap.
    pub heap_index: usize,
}

impl Block {
    /// Creates an empty block with its initial window.
    pub fn new(key: impl Into<String>, eviction_time: Instant) -> Self {
        Self {
            key: key.into(),
            parts_by_source: PartsBySource::new(),
            eviction_time,
            heap_index: usize::MAX,
        }
    }

    /// Total parts across all sources.
    pub fn part_count(&self) -> usize {
        self.parts_by_source.values().map(Vec::len).sum()
    }

    /// Number of distinct sources that have landed events here.
    pub fn source_count(&self) -> usize {
        self.parts_by_source.len()
    }
}
