//! StrataCache - Two-Tier Read/Write-Through Caching Engine
//!
//! A caching engine coordinating a fast process-local tier with a
//! shared out-of-process tier in front of a canonical record store,
//! with tag-based group invalidation, stampede control, and
//! refresh-ahead for hot keys.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  HTTP Boundary (api)                                            │
//! │      │ GetOrLoad / Put / Evict / EvictByTag / Refresh           │
//! │      ▼                                                          │
//! │  Cache Engine ── Local Tier ── Shared Tier                      │
//! │      │    Stampede Guard │ Tag Index │ Access Tracker           │
//! │      ▼                                                          │
//! │  Canonical Record Store (store)                                 │
//! │                                                                 │
//! │  Refresh-Ahead Scheduler ──▶ hottest keys, every interval       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`] - The two-tier engine and its collaborators
//! - [`store`] - Canonical record store contract and in-memory impl
//! - [`api`] - Thin HTTP boundary with conditional reads
//! - [`error`] - Error types

pub mod api;
pub mod cache;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use cache::{
    AccessTracker, CacheEngine, CacheTier, EngineConfig, EntryOptions, InMemorySharedTier,
    RefreshScheduler, SchedulerConfig, SharedTier, StampedeGuard, TagIndex,
};
pub use error::{Error, Result};
pub use store::{InMemoryRecordStore, Record, RecordStore};
