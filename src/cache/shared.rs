//! Shared Tier - Out-of-Process Cache Layer
//!
//! The shared tier is visible to every process instance and is reached
//! over I/O, so the interface is async and every operation can fail
//! with [`Error::TierUnavailable`]. The engine treats that failure as
//! degradation, never as a read failure.
//!
//! A real deployment would back this with Redis or similar; the
//! in-memory implementation here serves tests and single-process runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::entry::CacheEntry;
use crate::error::{Error, Result};

/// Shared (out-of-process) cache tier contract.
///
/// Implementations must provide per-key set/delete atomicity; nothing
/// stronger is assumed.
#[async_trait]
pub trait SharedTier: Send + Sync {
    /// Get a non-expired entry for the key
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace the entry for a key
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Delete the entry for a key, reporting whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// In-memory shared tier for testing and single-process deployments.
///
/// The availability toggle simulates an unreachable backend so the
/// engine's degradation paths can be exercised.
pub struct InMemorySharedTier {
    storage: DashMap<String, CacheEntry>,
    available: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemorySharedTier {
    /// Create a new in-memory shared tier
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle availability. While unavailable, every operation fails
    /// with `TierUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::TierUnavailable("in-memory tier marked down".into()))
        }
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the tier holds no entries
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Read operation count
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Write operation count
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Delete operation count
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

impl Default for InMemorySharedTier {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            available: AtomicBool::new(true),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl SharedTier for InMemorySharedTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.storage.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.storage.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.storage.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.storage.remove(key).is_some())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::time::Duration;

    fn make_entry(data: &[u8], ttl: Duration) -> CacheEntry {
        CacheEntry::new(Bytes::copy_from_slice(data), HashSet::new(), ttl)
    }

    #[tokio::test]
    async fn test_shared_tier_set_get_delete() {
        let tier = InMemorySharedTier::new();

        tier.set("item:1", make_entry(b"v", Duration::from_secs(60)))
            .await
            .unwrap();

        let entry = tier.get("item:1").await.unwrap();
        assert_eq!(entry.unwrap().value().as_ref(), b"v");

        assert!(tier.delete("item:1").await.unwrap());
        assert!(tier.get("item:1").await.unwrap().is_none());
        assert!(!tier.delete("item:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_shared_tier_expiry() {
        let tier = InMemorySharedTier::new();

        tier.set("item:1", make_entry(b"v", Duration::ZERO))
            .await
            .unwrap();

        assert!(tier.get("item:1").await.unwrap().is_none());
        // The expired residue was dropped on lookup.
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn test_shared_tier_unavailable() {
        let tier = InMemorySharedTier::new();
        tier.set_available(false);

        assert_matches!(tier.get("k").await, Err(Error::TierUnavailable(_)));
        assert_matches!(
            tier.set("k", make_entry(b"v", Duration::from_secs(60))).await,
            Err(Error::TierUnavailable(_))
        );
        assert_matches!(tier.delete("k").await, Err(Error::TierUnavailable(_)));

        tier.set_available(true);
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shared_tier_operation_counters() {
        let tier = InMemorySharedTier::new();

        tier.set("k", make_entry(b"v", Duration::from_secs(60)))
            .await
            .unwrap();
        tier.get("k").await.unwrap();
        tier.get("missing").await.unwrap();
        tier.delete("k").await.unwrap();

        assert_eq!(tier.writes(), 1);
        assert_eq!(tier.reads(), 2);
        assert_eq!(tier.deletes(), 1);
    }
}
