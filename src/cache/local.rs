//! Local Tier - Process-Private Cache
//!
//! Low-latency in-process tier backed by a sharded hashmap. Each shard
//! carries its own `RwLock`, so unrelated keys never contend. Expiry is
//! passive: expired entries are dropped lazily when a lookup touches
//! them.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::entry::CacheEntry;
use super::SHARD_COUNT;

/// Local (process-private) cache tier
pub struct LocalTier {
    shards: Vec<RwLock<HashMap<String, CacheEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LocalTier {
    /// Create an empty local tier
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, key: &str) -> &RwLock<HashMap<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // SHARD_COUNT is a power of two, so masking is a fast modulo
        &self.shards[(hasher.finish() as usize) & (SHARD_COUNT - 1)]
    }

    /// Get a non-expired entry for the key. Expired entries are removed
    /// on the way out and count as misses.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let shard = self.shard_for(key);

        let entry = {
            let guard = shard.read();
            guard.get(key).cloned()
        };

        match entry {
            Some(e) if e.is_expired() => {
                shard.write().remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(e) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(e)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace the entry for a key
    pub fn put(&self, key: String, entry: CacheEntry) {
        self.shard_for(&key).write().insert(key, entry);
    }

    /// Remove the entry for a key, returning it if present
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.shard_for(key).write().remove(key)
    }

    /// Check if a non-expired entry exists
    pub fn contains(&self, key: &str) -> bool {
        let guard = self.shard_for(key).read();
        guard.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Number of resident entries (including not-yet-collected expired ones)
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Check if the tier is empty
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Drop every entry
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for LocalTier {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
