//! The windowed block store.
//!
//! Ingest path (`add_data`), indexed eviction heap and the background
//! eviction loop. One store-wide lock serializes ingests and combine
//! callbacks; the eviction loop takes the same lock per tick.

use crate::block::{Block, BlockPart};
use crate::combine::CombineFn;
use crate::errors::WindowError;
use crate::logging;
use parking_lot::Mutex;
use shared_types::data::format_field_value;
use shared_types::{Data, KeyDefinition, Statistics};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct BlockStoreConfig {
    /// Ordered fields forming the composite correlation key.
    pub key_definitions: Vec<KeyDefinition>,
    /// Block count below which time-based eviction is inhibited.
    pub block_count_soft_limit: usize,
    /// Sliding window TTL of a block; reset on each new event landing in
    /// the block.
    pub block_window_ttl: Duration,
    /// Hard limit on how many times one part can be combined.
    pub block_part_max_join_count: u32,
    /// Absolute lifetime of a part from creation.
    pub block_part_max_age: Duration,
    /// Cadence of the eviction loop.
    pub eviction_interval: Duration,
}

impl BlockStoreConfig {
    /// Configuration with common defaults for the given key fields.
    pub fn new(key_definitions: Vec<KeyDefinition>) -> Self {
        Self {
            key_definitions,
            block_count_soft_limit: 1000,
            block_window_ttl: Duration::from_secs(60),
            block_part_max_join_count: 1,
            block_part_max_age: Duration::from_secs(15),
            eviction_interval: Duration::from_secs(1),
        }
    }
}

struct StoreState {
    blocks: HashMap<String, Block>,
    heap: Vec<String>,
    stats: Statistics,
    last_accessed: Instant,
    shut_down: bool,
}

impl StoreState {
    fn eviction_time_at(&self, heap_index: usize) -> Instant {
        self.blocks[&self.heap[heap_index]].eviction_time
    }

    fn heap_swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let key_a = self.heap[a].clone();
        let key_b = self.heap[b].clone();
        if let Some(block) = self.blocks.get_mut(&key_a) {
            block.heap_index = a;
        }
        if let Some(block) = self.blocks.get_mut(&key_b) {
            block.heap_index = b;
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.eviction_time_at(index) >= self.eviction_time_at(parent) {
                break;
            }
            self.heap_swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut earliest = index;
            if left < self.heap.len() && self.eviction_time_at(left) < self.eviction_time_at(earliest)
            {
                earliest = left;
            }
            if right < self.heap.len()
                && self.eviction_time_at(right) < self.eviction_time_at(earliest)
            {
                earliest = right;
            }
            if earliest == index {
                break;
            }
            self.heap_swap(index, earliest);
            index = earliest;
        }
    }

    /// Pushes the (already inserted) block's key onto the heap.
    fn heap_push(&mut self, key: &str) {
        let index = self.heap.len();
        self.heap.push(key.to_string());
        if let Some(block) = self.blocks.get_mut(key) {
            block.heap_index = index;
        }
        self.sift_up(index);
    }

    /// Re-heapifies after a block's eviction time changed.
    fn heap_fix(&mut self, index: usize) {
        self.sift_up(index);
        self.sift_down(index);
    }

    /// Removes the heap head block entirely, returning it.
    fn remove_head(&mut self) -> Option<Block> {
        let head_key = self.heap.first()?.clone();
        let block = self.blocks.remove(&head_key)?;
        self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            let moved = self.heap[0].clone();
            if let Some(moved_block) = self.blocks.get_mut(&moved) {
                moved_block.heap_index = 0;
            }
            self.sift_down(0);
        }
        Some(block)
    }
}

/// Sliding-window multi-source correlation store.
pub struct BlockStore {
    config: BlockStoreConfig,
    combine: CombineFn,
    state: Arc<Mutex<StoreState>>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl BlockStore {
    /// Creates a store and starts its eviction loop.
    pub fn new(config: BlockStoreConfig, combine: CombineFn) -> Self {
        logging::log_store_created(
            &config.key_definitions,
            config.block_count_soft_limit,
            config.block_part_max_join_count,
            config.block_window_ttl,
            config.block_part_max_age,
        );

        let state = Arc::new(Mutex::new(StoreState {
            blocks: HashMap::new(),
            heap: Vec::new(),
            stats: Statistics::new(),
            last_accessed: Instant::now(),
            shut_down: false,
        }));

        let (stop_tx, stop_rx) = mpsc::channel();
        let loop_state = Arc::clone(&state);
        let soft_limit = config.block_count_soft_limit;
        let interval = config.eviction_interval;
        std::thread::spawn(move || eviction_loop(&loop_state, soft_limit, interval, &stop_rx));

        Self {
            config,
            combine,
            state,
            stop_tx: Mutex::new(Some(stop_tx)),
        }
    }

    /// The store's configuration.
    pub fn config(&self) -> &BlockStoreConfig {
        &self.config
    }

    /// Builds the composite key for an event.
    ///
    /// Each key field's value is rendered and joined with a trailing `|`
    /// per field. A missing field rejects the event.
    pub fn key_value(&self, event: &Data) -> Result<String, WindowError> {
        let mut key = String::new();
        for def in &self.config.key_definitions {
            let value = event
                .get(&def.name)
                .ok_or_else(|| WindowError::MissingKeyField {
                    field: def.name.clone(),
                })?;
            key.push_str(&format_field_value(value));
            key.push('|');
        }
        Ok(key)
    }

    /// Ingests one event from `source_id`.
    ///
    /// The event lands in its key's block and is combined against every
    /// surviving part from every other source, in per-source insertion
    /// order; `callback` receives each combined output. Expired and
    /// join-exhausted parts are dropped in place during the sweep.
    /// Finally the block's sliding window is refreshed.
    ///
    /// On a combine or callback error the call aborts; state already
    /// mutated is kept (at-least-once downstream).
    pub fn add_data(
        &self,
        source_id: &str,
        event: Data,
        callback: &mut dyn FnMut(Data) -> Result<(), WindowError>,
    ) -> Result<(), WindowError> {
        let mut state = self.state.lock();
        let started = Instant::now();
        let result = self.ingest(&mut state, source_id, event, callback);
        let elapsed = started.elapsed();
        state.stats.lap_with(elapsed);
        result
    }

    fn ingest(
        &self,
        state: &mut StoreState,
        source_id: &str,
        event: Data,
        callback: &mut dyn FnMut(Data) -> Result<(), WindowError>,
    ) -> Result<(), WindowError> {
        if state.shut_down {
            return Err(WindowError::ShutDown);
        }

        let now = Instant::now();
        state.last_accessed = now;

        let key = self.key_value(&event)?;

        if !state.blocks.contains_key(&key) {
            let block = Block::new(key.clone(), now + self.config.block_window_ttl);
            state.blocks.insert(key.clone(), block);
            state.heap_push(&key);
            logging::log_block_created(
                &key,
                self.config.block_window_ttl,
                state.blocks.len(),
                self.config.block_count_soft_limit,
            );
        }

        let mut inbound = BlockPart::new(event, now + self.config.block_part_max_age);
        let avg_duration = state.stats.avg();
        let max_join_count = self.config.block_part_max_join_count;

        let Some(block) = state.blocks.get_mut(&key) else {
            // Inserted above; absence is a map/heap invariant violation.
            unreachable!("block vanished under the store lock");
        };

        {
            let existing_parts = block.parts_by_source.get(source_id).map_or(0, Vec::len);
            let total_sources = block.source_count()
                + usize::from(!block.parts_by_source.contains_key(source_id));
            logging::log_part_added(
                &key,
                source_id,
                existing_parts,
                total_sources,
                self.config.block_part_max_age,
            );
        }

        for (stored_source, parts) in block.parts_by_source.iter_mut() {
            if stored_source == source_id {
                continue; // never combine events from the same source
            }

            let mut write = 0usize;
            let mut skipped_expired = 0usize;
            let mut skipped_max_joins = 0usize;

            for read in 0..parts.len() {
                let expired = parts[read].expired(now);
                let max_joins = parts[read].max_joins_reached(max_join_count);
                if expired || max_joins {
                    if expired {
                        skipped_expired += 1;
                    }
                    if max_joins {
                        skipped_max_joins += 1;
                    }
                    continue;
                }

                parts.swap(write, read);
                let combined = (self.combine)(
                    stored_source,
                    &mut parts[write],
                    source_id,
                    &mut inbound,
                    &self.config.key_definitions,
                )?;

                logging::log_combine_completed(
                    &key,
                    &self.config.key_definitions,
                    &combined,
                    stored_source,
                    source_id,
                    parts[write].join_count,
                    inbound.join_count,
                    max_join_count,
                    avg_duration,
                );

                callback(combined)?;
                write += 1;
            }

            if skipped_expired > 0 || skipped_max_joins > 0 {
                logging::log_parts_skipped(
                    &key,
                    stored_source,
                    skipped_expired,
                    skipped_max_joins,
                    write,
                    self.config.block_part_max_age,
                    max_join_count,
                );
            }
            parts.truncate(write);
        }

        block
            .parts_by_source
            .entry(source_id.to_string())
            .or_default()
            .push(inbound);

        // Sliding window: every event landing in the block refreshes it.
        block.eviction_time = now + self.config.block_window_ttl;
        let heap_index = block.heap_index;
        state.heap_fix(heap_index);
        Ok(())
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.state.lock().blocks.len()
    }

    /// Returns true when the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a block exists for `key`.
    pub fn contains_block(&self, key: &str) -> bool {
        self.state.lock().blocks.contains_key(key)
    }

    /// Total parts currently stored under `key`, per source.
    pub fn part_counts(&self, key: &str) -> HashMap<String, usize> {
        let state = self.state.lock();
        state
            .blocks
            .get(key)
            .map(|block| {
                block
                    .parts_by_source
                    .iter()
                    .map(|(source, parts)| (source.clone(), parts.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the ingest statistics.
    pub fn statistics(&self) -> Statistics {
        self.state.lock().stats.clone()
    }

    /// True when no ingest has run for longer than `idle_duration`.
    pub fn is_idle(&self, idle_duration: Duration) -> bool {
        let state = self.state.lock();
        state.last_accessed.elapsed() > idle_duration
    }

    /// Stops the eviction loop and rejects further ingests. Logs a
    /// summary of the store's final state.
    pub fn shutdown(&self) {
        let (block_count, total_parts, unique_sources, stats) = {
            let mut state = self.state.lock();
            state.shut_down = true;

            let mut sources: HashMap<&str, usize> = HashMap::new();
            let mut total_parts = 0usize;
            for block in state.blocks.values() {
                for (source, parts) in &block.parts_by_source {
                    total_parts += parts.len();
                    *sources.entry(source.as_str()).or_default() += parts.len();
                }
            }
            (
                state.blocks.len(),
                total_parts,
                sources.len(),
                state.stats.clone(),
            )
        };

        logging::log_store_shutdown(
            &self.config.key_definitions,
            block_count,
            total_parts,
            unique_sources,
            &stats,
        );
        self.stop_tx.lock().take();
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        self.stop_tx.lock().take();
    }
}

fn eviction_loop(
    state: &Arc<Mutex<StoreState>>,
    soft_limit: usize,
    interval: Duration,
    stop_rx: &mpsc::Receiver<()>,
) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => evict_expired_blocks(state, soft_limit),
            // Sender dropped or explicit stop: exit.
            _ => return,
        }
    }
}

/// One eviction pass. While the block count sits at or below the soft
/// limit nothing is evicted; above it, lapsed blocks pop oldest-first.
fn evict_expired_blocks(state: &Arc<Mutex<StoreState>>, soft_limit: usize) {
    let now = Instant::now();
    let mut state = state.lock();

    loop {
        if state.blocks.len() <= soft_limit {
            return;
        }
        let Some(head_key) = state.heap.first() else {
            return;
        };
        if state.blocks[head_key].eviction_time >= now {
            return;
        }
        if let Some(block) = state.remove_head() {
            logging::log_block_evicted(&block, state.blocks.len(), soft_limit);
        }
    }
}
