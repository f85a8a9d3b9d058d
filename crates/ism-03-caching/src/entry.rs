//! Cache entries and the eviction-ordered index.
//!
//! Entries live in a map for O(1) lookup; an explicit binary min-heap of
//! keys, ordered by eviction time, gives the cleanup loop the next entry
//! to expire in O(1). Each entry records its own heap slot so targeted
//! removal and TTL refresh re-heapify in O(log n) instead of scanning.
//!
//! Invariant: every key in the map appears exactly once in the heap at
//! the position its entry records, and vice versa.

use crate::cache::CacheValue;
use std::collections::HashMap;
use std::time::Instant;

/// One cached item.
pub(crate) struct CacheEntry {
    pub key: String,
    pub value: CacheValue,
    pub evict_at: Instant,
    pub heap_index: usize,
}

/// Map plus eviction-ordered heap over the same entries.
#[derive(Default)]
pub(crate) struct EntryStore {
    pub items: HashMap<String, CacheEntry>,
    heap: Vec<String>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            heap: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// Key of the entry with the earliest eviction time.
    pub fn peek(&self) -> Option<&CacheEntry> {
        self.heap.first().and_then(|k| self.items.get(k))
    }

    /// Inserts a new entry or refreshes an existing one in place.
    pub fn upsert(&mut self, key: &str, value: CacheValue, evict_at: Instant) {
        if let Some(entry) = self.items.get_mut(key) {
            entry.value = value;
            entry.evict_at = evict_at;
            let index = entry.heap_index;
            self.fix(index);
            return;
        }

        let heap_index = self.heap.len();
        self.items.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                evict_at,
                heap_index,
            },
        );
        self.heap.push(key.to_string());
        self.sift_up(heap_index);
    }

    /// Removes `key` from both views. No-op when absent.
    pub fn remove(&mut self, key: &str) {
        let Some(entry) = self.items.remove(key) else {
            return;
        };
        let index = entry.heap_index;
        self.heap.swap_remove(index);
        if index < self.heap.len() {
            let moved = self.heap[index].clone();
            if let Some(moved_entry) = self.items.get_mut(&moved) {
                moved_entry.heap_index = index;
            }
            self.fix(index);
        }
    }

    /// Pops the heap head when it expired before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<String> {
        let head = self.heap.first()?.clone();
        let entry = self.items.get(&head)?;
        if entry.evict_at > now {
            return None;
        }
        self.remove(&head);
        Some(head)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.heap.clear();
    }

    fn evict_at(&self, heap_index: usize) -> Instant {
        self.items[&self.heap[heap_index]].evict_at
    }

    fn fix(&mut self, index: usize) {
        self.sift_up(index);
        self.sift_down(index);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let key_a = self.heap[a].clone();
        let key_b = self.heap[b].clone();
        if let Some(entry) = self.items.get_mut(&key_a) {
            entry.heap_index = a;
        }
        if let Some(entry) = self.items.get_mut(&key_b) {
            entry.heap_index = b;
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.evict_at(index) >= self.evict_at(parent) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut smallest = index;
            if left < self.heap.len() && self.evict_at(left) < self.evict_at(smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.evict_at(right) < self.evict_at(smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    /// Debug check that map and heap agree. Used by tests only.
    #[cfg(test)]
    pub fn check_consistency(&self) {
        assert_eq!(self.items.len(), self.heap.len());
        for (i, key) in self.heap.iter().enumerate() {
            let entry = self.items.get(key).expect("heap key missing from map");
            assert_eq!(entry.heap_index, i, "heap index mismatch for {key}");
        }
    }
}
