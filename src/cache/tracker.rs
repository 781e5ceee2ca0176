//! Access Tracker
//!
//! Approximate per-key access counters feeding hot-key selection.
//! Increments are relaxed and a counter racing with [`AccessTracker::reset_all`]
//! may be lost; only an approximate hot set is required, so that is
//! acceptable.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Approximate access counting with deterministic top-N selection
pub struct AccessTracker {
    counts: DashMap<String, AtomicU64>,
}

impl AccessTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self { counts: DashMap::new() }
    }

    /// Record one access for the key
    pub fn record_access(&self, key: &str) {
        if let Some(counter) = self.counts.get(key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counts
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current count for a key
    pub fn count(&self, key: &str) -> u64 {
        self.counts
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// The `n` hottest keys, ordered by descending count with lexical
    /// key order breaking ties, so sweeps are reproducible.
    pub fn top_n(&self, n: usize) -> Vec<String> {
        let mut entries: Vec<(String, u64)> = self
            .counts
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries.into_iter().map(|(key, _)| key).collect()
    }

    /// Clear every counter for a fresh observation window
    pub fn reset_all(&self) {
        self.counts.clear();
    }

    /// Number of keys with recorded accesses
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if the tracker has no recorded accesses
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
