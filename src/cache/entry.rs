//! Cache Entry Types
//!
//! A [`CacheEntry`] is the unit stored in both tiers. Each copy carries
//! its own expiry plus the expiry of its shared-tier counterpart, so a
//! local copy can never be presumed fresh past the shared validity
//! window (`expires_at <= shared_expires_at` always holds).

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bytes::Bytes;

/// A cached value plus the bookkeeping both tiers need.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Bytes,
    tags: HashSet<String>,
    /// When this copy stops being servable.
    expires_at: Instant,
    /// When the shared-tier counterpart stops being servable.
    shared_expires_at: Instant,
    /// Negative-caching tombstone: the key is known to have no record.
    negative: bool,
}

impl CacheEntry {
    /// Create an entry destined for the shared tier, where the copy's
    /// own expiry and the shared expiry coincide.
    pub fn new(value: Bytes, tags: HashSet<String>, shared_ttl: Duration) -> Self {
        let expires_at = Instant::now() + shared_ttl;
        Self {
            value,
            tags,
            expires_at,
            shared_expires_at: expires_at,
            negative: false,
        }
    }

    /// Create a short-lived tombstone recording that no record exists.
    pub fn tombstone(ttl: Duration) -> Self {
        let expires_at = Instant::now() + ttl;
        Self {
            value: Bytes::new(),
            tags: HashSet::new(),
            expires_at,
            shared_expires_at: expires_at,
            negative: true,
        }
    }

    /// Derive the local-tier copy of this entry. The local expiry is
    /// clamped to whatever shared validity remains.
    pub fn for_local(&self, local_ttl: Duration) -> Self {
        let now = Instant::now();
        let remaining = self.shared_expires_at.saturating_duration_since(now);
        let expires_at = now + local_ttl.min(remaining);
        Self {
            value: self.value.clone(),
            tags: self.tags.clone(),
            expires_at,
            shared_expires_at: self.shared_expires_at,
            negative: self.negative,
        }
    }

    /// Get the cached payload
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Get the tag set supplied with the most recent write
    pub fn tags(&self) -> &HashSet<String> {
        &self.tags
    }

    /// Check if this copy has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Remaining validity of this copy
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Check if this is a negative-caching tombstone
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Approximate size of the payload in bytes
    pub fn size(&self) -> u64 {
        self.value.len() as u64
    }
}

// =============================================================================
// Tests
// =============================================================================
