//! Two-Tier Cache Engine
//!
//! Read-through/write-through caching across a process-local tier and a
//! shared out-of-process tier, with tag-based group invalidation,
//! stampede control, and refresh-ahead for hot keys.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         Cache Engine                              │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  Local Tier (in-process)   │  Shared Tier (out-of-process)        │
//! │  ┌──────────────────────┐  │  ┌──────────────────────────────┐    │
//! │  │ Sharded map (64-way) │  │  │ SharedTier trait             │    │
//! │  │ localExpiry ≤ shared │  │  │ (in-memory impl provided)    │    │
//! │  └──────────────────────┘  │  └──────────────────────────────┘    │
//! │        │                   │            │                         │
//! │        └───────┬───────────┴────────────┘                         │
//! │                │                                                  │
//! │   Stampede Guard │ Tag Index │ Access Tracker │ Fingerprints      │
//! │                │                                                  │
//! │        Refresh-Ahead Scheduler (periodic, cancellable)            │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - No global lock: local tier, tag index, and stampede guard are all
//!   sharded by key or tag
//! - Shared-tier writes complete before the corresponding local write
//! - Loads are serialized per key; a cold miss invokes the loader once
//!   no matter how many callers race
//! - Loader failures are never cached

mod entry;
mod local;
mod metrics;
mod scheduler;
mod shared;
mod stampede;
mod tags;
mod tracker;
pub mod engine;
pub mod fingerprint;

pub use engine::{CacheEngine, CacheTier, EngineConfig, EntryOptions};
pub use entry::CacheEntry;
pub use local::LocalTier;
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use scheduler::{RefreshLoader, RefreshScheduler, SchedulerConfig};
pub use shared::{InMemorySharedTier, SharedTier};
pub use stampede::{Acquired, CompletionGuard, LoadOutcome, StampedeGuard};
pub use tags::TagIndex;
pub use tracker::AccessTracker;

/// Number of shards for the local tier and tag index
pub const SHARD_COUNT: usize = 64;

/// Number of shards for the stampede guard
pub const GUARD_SHARD_COUNT: usize = 16;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_counts_are_powers_of_two() {
        // Power of 2 enables fast modulo via bitwise AND
        assert!(SHARD_COUNT.is_power_of_two());
        assert!(GUARD_SHARD_COUNT.is_power_of_two());
    }
}
