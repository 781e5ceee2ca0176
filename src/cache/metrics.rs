//! Cache Metrics Collection
//!
//! In-process counters for monitoring engine behavior. All counters use
//! relaxed atomics; snapshots are not linearizable.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    local_hits: AtomicU64,
    local_misses: AtomicU64,
    shared_hits: AtomicU64,
    shared_misses: AtomicU64,
    shared_unavailable: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    negative_hits: AtomicU64,
    stampede_waits: AtomicU64,
    evictions: AtomicU64,
    refreshes: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_miss(&self) {
        self.local_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shared_hit(&self) {
        self.shared_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shared_miss(&self) {
        self.shared_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shared_unavailable(&self) {
        self.shared_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_negative_hit(&self) {
        self.negative_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stampede_wait(&self) {
        self.stampede_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            local_misses: self.local_misses.load(Ordering::Relaxed),
            shared_hits: self.shared_hits.load(Ordering::Relaxed),
            shared_misses: self.shared_misses.load(Ordering::Relaxed),
            shared_unavailable: self.shared_unavailable.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            stampede_waits: self.stampede_waits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the engine's counters
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub local_hits: u64,
    pub local_misses: u64,
    pub shared_hits: u64,
    pub shared_misses: u64,
    pub shared_unavailable: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub negative_hits: u64,
    pub stampede_waits: u64,
    pub evictions: u64,
    pub refreshes: u64,
}

impl MetricsSnapshot {
    /// Hit ratio across both tiers (0.0 - 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.local_hits + self.shared_hits) as f64;
        let total = hits + self.loads as f64 + self.load_failures as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
