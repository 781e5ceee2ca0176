//! Canonical Record Store
//!
//! The system of record the cache sits in front of. The engine only
//! needs `get` and `upsert`; persistence guarantees belong to the
//! backing implementation, not to this crate.
//!
//! The store is an explicitly owned instance passed into its consumers
//! by `Arc`, never a global singleton. Hot-key identification lives in
//! the engine's access tracker, so the store carries no access
//! counting of its own.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A canonical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Last modification time, stamped on upsert
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Create a record stamped with the current time
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Canonical-store contract required by the engine's collaborators
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by id
    async fn get(&self, id: &str) -> Result<Option<Record>>;

    /// Insert or replace a record, stamping its modification time.
    /// Returns the record as stored.
    async fn upsert(&self, record: Record) -> Result<Record>;
}

/// In-memory canonical store for testing and single-process runs
pub struct InMemoryRecordStore {
    records: DashMap<String, Record>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Read operation count
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Write operation count
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<Record>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn upsert(&self, mut record: Record) -> Result<Record> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        record.updated_at = Utc::now();
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}

// =============================================================================
// Tests
// =============================================================================
