//! Bounded in-memory cache shared between concurrent callers.
//!
//! Lookups take the read lock and bump per-entry atomic counters, so any number of readers
//! proceed in parallel. Inserts and evictions take the write lock and exclude both readers
//! and each other; a reader never observes a half-written entry.

use log::debug;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Fraction of entries dropped when a full cache receives a new key.
pub const EVICTION_FRACTION: f64 = 0.25;

/// Eviction policy. Each strategy also fixes the cache's size bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Least recently used goes first.
    Lru,
    /// Least frequently used goes first; recency breaks ties.
    Lfu,
    /// Blend of recency and hit count.
    #[default]
    Adaptive,
    /// Small LRU cache.
    Conservative,
    /// Large LRU cache.
    Aggressive,
}

impl CacheStrategy {
    pub fn max_entries(&self) -> usize {
        match self {
            CacheStrategy::Lru => 100,
            CacheStrategy::Lfu => 100,
            CacheStrategy::Adaptive => 200,
            CacheStrategy::Conservative => 50,
            CacheStrategy::Aggressive => 500,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    last_access: AtomicU64,
    hits: AtomicU64,
}

/// Counters reported by [`AdaptiveCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

pub struct AdaptiveCache<V> {
    strategy: CacheStrategy,
    capacity: usize,
    entries: RwLock<FxHashMap<String, CacheEntry<V>>>,
    /// Logical clock; every access takes a fresh tick.
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> AdaptiveCache<V> {
    pub fn new(strategy: CacheStrategy) -> Self {
        Self::with_capacity(strategy, strategy.max_entries())
    }

    /// Cache with an explicit bound instead of the strategy's preset. A zero bound is raised to 1.
    pub fn with_capacity(strategy: CacheStrategy, capacity: usize) -> Self {
        Self {
            strategy,
            capacity: capacity.max(1),
            entries: RwLock::new(FxHashMap::default()),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                entry.hits.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value`, evicting the lowest-value quarter first if the cache is full.
    /// Replacing an existing key never evicts.
    pub fn insert(&self, key: String, value: V) {
        let now = self.tick();
        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let count = ((entries.len() as f64 * EVICTION_FRACTION) as usize).max(1);
            self.evict_locked(&mut entries, count, now);
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                last_access: AtomicU64::new(now),
                hits: AtomicU64::new(0),
            },
        );
    }

    /// Drops `fraction` of the entries by retention score, at least one if any exist.
    /// Returns how many were dropped.
    pub fn shrink(&self, fraction: f64) -> usize {
        let now = self.tick();
        let mut entries = self.entries.write();
        if entries.is_empty() {
            return 0;
        }
        let count = ((entries.len() as f64 * fraction.clamp(0.0, 1.0)) as usize).max(1);
        self.evict_locked(&mut entries, count, now);
        count
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drops `count` entries with the lowest retention score. Caller holds the write lock.
    fn evict_locked(&self, entries: &mut FxHashMap<String, CacheEntry<V>>, count: usize, now: u64) {
        let max_hits = entries.values().map(|e| e.hits.load(Ordering::Relaxed)).max().unwrap_or(0);
        let mut scored: Vec<(f64, u64, String)> = entries
            .iter()
            .map(|(key, entry)| {
                let last = entry.last_access.load(Ordering::Relaxed);
                let hits = entry.hits.load(Ordering::Relaxed);
                (self.retention_score(last, hits, max_hits, now), last, key.clone())
            })
            .collect();
        // Lowest score first; older access breaks ties so eviction order is deterministic
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then_with(|| a.2.cmp(&b.2)));
        for (_, _, key) in scored.into_iter().take(count) {
            entries.remove(&key);
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        debug!("Cache ({:?}) evicted {} entries, {} remain", self.strategy, count, entries.len());
    }

    /// Higher scores survive eviction.
    fn retention_score(&self, last_access: u64, hits: u64, max_hits: u64, now: u64) -> f64 {
        let recency = if now == 0 { 0.0 } else { last_access as f64 / now as f64 };
        match self.strategy {
            CacheStrategy::Lru | CacheStrategy::Conservative | CacheStrategy::Aggressive => recency,
            CacheStrategy::Lfu => hits as f64,
            CacheStrategy::Adaptive => {
                let frequency = if max_hits == 0 { 0.0 } else { hits as f64 / max_hits as f64 };
                0.5 * recency + 0.5 * frequency
            }
        }
    }
}

/// Incremental builder for deterministic cache keys.
///
/// Floats are hashed by their bit pattern, so keys are exact: two inputs share a key only if
/// every number is bit-identical.
pub struct CacheKeyBuilder {
    hasher: Sha256,
}

impl CacheKeyBuilder {
    pub fn new(namespace: &str) -> Self {
        let mut builder = Self { hasher: Sha256::new() };
        builder.push_str(namespace);
        builder
    }

    pub fn push_str(&mut self, value: &str) -> &mut Self {
        self.push_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn push_f64(&mut self, value: f64) -> &mut Self {
        // -0.0 and 0.0 describe the same geometry
        let normalized = if value == 0.0 { 0.0 } else { value };
        self.push_u64(normalized.to_bits())
    }

    /// Hex-encoded SHA-256 of everything pushed so far.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
