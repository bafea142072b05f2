//! Shard Handle Cache
//!
//! Bounded map of shard number -> open index file. When full, a random entry
//! is evicted: access clusters around the newest shard, so anything older
//! is equally unlikely to be needed again.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rand::seq::IteratorRandom;

use crate::error::Result;

/// Bounded pool of open per-shard handles with random eviction
#[derive(Debug)]
pub struct ShardCache<T> {
    entries: HashMap<u64, T>,
    capacity: usize,
}

impl<T> ShardCache<T> {
    /// Create a cache holding at most `capacity` (at least 1) entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Get the entry for `shard`, creating it with `open` if absent
    ///
    /// Evicts one random entry first when the cache is full. If `open`
    /// fails nothing is inserted (an eviction may still have happened).
    pub fn get_or_open<F>(&mut self, shard: u64, open: F) -> Result<&mut T>
    where
        F: FnOnce() -> Result<T>,
    {
        if !self.entries.contains_key(&shard) && self.entries.len() >= self.capacity {
            self.evict_random();
        }
        match self.entries.entry(shard) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(open()?)),
        }
    }

    pub fn get_mut(&mut self, shard: u64) -> Option<&mut T> {
        self.entries.get_mut(&shard)
    }

    pub fn contains(&self, shard: u64) -> bool {
        self.entries.contains_key(&shard)
    }

    /// Drop the entry for `shard`
    pub fn remove(&mut self, shard: u64) -> Option<T> {
        self.entries.remove(&shard)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached shard numbers, ascending
    pub fn shards(&self) -> Vec<u64> {
        let mut shards: Vec<u64> = self.entries.keys().copied().collect();
        shards.sort_unstable();
        shards
    }

    fn evict_random(&mut self) {
        let victim = self.entries.keys().copied().choose(&mut rand::thread_rng());
        if let Some(victim) = victim {
            self.entries.remove(&victim);
            tracing::trace!(shard = victim, "evicted shard handle");
        }
    }
}
