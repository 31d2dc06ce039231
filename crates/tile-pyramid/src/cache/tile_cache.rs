//! LRU cache for decoded tile rasters.

use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pyramid_common::TileCoord;

use crate::config::TileCacheConfig;
use crate::types::{CacheStats, Raster};

/// LRU cache of decoded tiles, bounded by entry count.
///
/// Inserting beyond `soft_limit` entries evicts least recently used tiles
/// until `capacity` remain.
pub struct TileCache {
    cache: LruCache<TileCoord, Arc<Raster>>,
    capacity: usize,
    soft_limit: usize,
    current_memory: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    pub fn new(config: &TileCacheConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            cache: LruCache::unbounded(),
            capacity,
            soft_limit: config.soft_limit.max(capacity),
            current_memory: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Try to get a tile from the cache.
    ///
    /// Returns `Some(raster)` on a hit and promotes the entry.
    pub fn get(&mut self, key: &TileCoord) -> Option<Arc<Raster>> {
        if let Some(raster) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(Arc::clone(raster))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Check if a key exists in the cache without updating LRU order.
    pub fn contains(&self, key: &TileCoord) -> bool {
        self.cache.contains(key)
    }

    pub fn insert(&mut self, key: TileCoord, raster: Arc<Raster>) {
        let size = raster.byte_size();
        if let Some(old) = self.cache.put(key, raster) {
            self.current_memory = self.current_memory.saturating_sub(old.byte_size());
        }
        self.current_memory += size;

        if self.cache.len() > self.soft_limit {
            self.evict_to(self.capacity);
        }
    }

    /// Evict least recently used entries until at most `target` remain.
    ///
    /// Returns the number of entries evicted.
    pub fn evict_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.cache.len() > target {
            match self.cache.pop_lru() {
                Some((_, raster)) => {
                    self.current_memory = self.current_memory.saturating_sub(raster.byte_size());
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
