//! Cache Engine - Two-Tier Orchestration
//!
//! Coordinates the local and shared tiers in front of an external
//! loader: reads check local, then shared, then serialize a single
//! loader call per key through the stampede guard. Writes go shared
//! first, then local, then update the tag index.
//!
//! # Failure semantics
//!
//! - A down shared tier degrades reads to local-or-loader and writes to
//!   local-only; it never fails a read on its own
//! - Loader failures propagate to every waiter and are never cached
//! - A tag sweep continues past per-key failures and reports the
//!   stragglers for retry

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::local::LocalTier;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::shared::SharedTier;
use super::stampede::{Acquired, CompletionGuard, LoadOutcome, StampedeGuard};
use super::tags::TagIndex;
use super::tracker::AccessTracker;
use crate::error::{Error, Result};

/// Which tier satisfied a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Served from the process-local tier
    Local,
    /// Served from the shared tier (local repopulated)
    Shared,
    /// Missed both tiers; the loader produced the value
    Loaded,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::Local => write!(f, "local"),
            CacheTier::Shared => write!(f, "shared"),
            CacheTier::Loaded => write!(f, "loaded"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default local-tier entry lifetime
    pub local_ttl: Duration,
    /// Default shared-tier entry lifetime
    pub shared_ttl: Duration,
    /// Cache loader misses briefly as tombstones
    pub negative_caching: bool,
    /// Tombstone lifetime when negative caching is on
    pub negative_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_ttl: Duration::from_secs(30 * 60),
            shared_ttl: Duration::from_secs(24 * 60 * 60),
            negative_caching: false,
            negative_ttl: Duration::from_secs(5),
        }
    }
}

/// Per-operation TTL overrides; `None` falls back to [`EngineConfig`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryOptions {
    pub local_ttl: Option<Duration>,
    pub shared_ttl: Option<Duration>,
}

/// Two-tier cache engine
pub struct CacheEngine {
    local: Arc<LocalTier>,
    shared: Arc<dyn SharedTier>,
    tags: Arc<TagIndex>,
    guard: Arc<StampedeGuard>,
    tracker: Arc<AccessTracker>,
    metrics: Arc<CacheMetrics>,
    config: EngineConfig,
}

impl CacheEngine {
    /// Create a new engine over the given shared tier
    pub fn new(shared: Arc<dyn SharedTier>, config: EngineConfig) -> Self {
        Self {
            local: Arc::new(LocalTier::new()),
            shared,
            tags: Arc::new(TagIndex::new()),
            guard: Arc::new(StampedeGuard::new()),
            tracker: Arc::new(AccessTracker::new()),
            metrics: Arc::new(CacheMetrics::new()),
            config,
        }
    }

    fn resolve_ttls(&self, opts: EntryOptions) -> (Duration, Duration) {
        let shared_ttl = opts.shared_ttl.unwrap_or(self.config.shared_ttl);
        // A local copy may never be presumed fresh past its shared
        // counterpart's validity window.
        let local_ttl = opts.local_ttl.unwrap_or(self.config.local_ttl).min(shared_ttl);
        (local_ttl, shared_ttl)
    }

    /// Read through the tiers, falling back to the loader on a full
    /// miss. Concurrent full misses on the same key invoke the loader
    /// exactly once.
    ///
    /// Returns the value and the tier that satisfied it. Fails with
    /// [`Error::NotFound`] when the loader reports no record and with
    /// [`Error::LoadError`] when the loader itself fails.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &str,
        tags: Vec<String>,
        opts: EntryOptions,
        loader: F,
    ) -> Result<(Bytes, CacheTier)>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Bytes>>> + Send + 'static,
    {
        self.tracker.record_access(key);
        let (local_ttl, shared_ttl) = self.resolve_ttls(opts);

        if let Some(entry) = self.local.get(key) {
            self.metrics.record_local_hit();
            if entry.is_negative() {
                self.metrics.record_negative_hit();
                return Err(Error::NotFound(key.to_string()));
            }
            return Ok((entry.value().clone(), CacheTier::Local));
        }
        self.metrics.record_local_miss();

        match self.shared.get(key).await {
            Ok(Some(entry)) => {
                self.metrics.record_shared_hit();
                let local_copy = entry.for_local(local_ttl);
                if entry.is_negative() {
                    self.metrics.record_negative_hit();
                    self.local.put(key.to_string(), local_copy);
                    return Err(Error::NotFound(key.to_string()));
                }
                let value = entry.value().clone();
                self.local.put(key.to_string(), local_copy);
                return Ok((value, CacheTier::Shared));
            }
            Ok(None) => {
                self.metrics.record_shared_miss();
            }
            Err(e) if e.is_degradation() => {
                self.metrics.record_shared_unavailable();
                warn!(key, error = %e, "shared tier unavailable, falling through to loader");
            }
            Err(e) => return Err(e),
        }

        let value = self
            .load_via_guard(key, tags, local_ttl, shared_ttl, loader)
            .await?;
        Ok((value, CacheTier::Loaded))
    }

    /// Write through: shared tier first, then local, then replace the
    /// key's tag membership with exactly `tags`. An in-flight load for
    /// the key is left untouched.
    pub async fn put(
        &self,
        key: &str,
        value: Bytes,
        tags: Vec<String>,
        opts: EntryOptions,
    ) -> Result<()> {
        let (local_ttl, shared_ttl) = self.resolve_ttls(opts);
        let tag_set: HashSet<String> = tags.into_iter().collect();
        let entry = CacheEntry::new(value, tag_set.clone(), shared_ttl);

        match self.shared.set(key, entry.clone()).await {
            Ok(()) => {}
            Err(e) if e.is_degradation() => {
                self.metrics.record_shared_unavailable();
                warn!(key, error = %e, "shared tier write skipped, caching locally only");
            }
            Err(e) => return Err(e),
        }

        self.local.put(key.to_string(), entry.for_local(local_ttl));
        self.tags.replace(key, &tag_set);
        Ok(())
    }

    /// Remove the key from both tiers and from every tag set it belongs
    /// to. The shared delete goes first: if it fails, nothing else has
    /// been touched and a retry sees consistent state.
    pub async fn evict(&self, key: &str) -> Result<()> {
        self.shared.delete(key).await?;
        self.local.remove(key);
        self.tags.remove(key);
        self.metrics.record_eviction();
        debug!(key, "evicted");
        Ok(())
    }

    /// Evict every key currently in the tag's set, key by key under
    /// fine-grained locks so unrelated traffic is not blocked. Failed
    /// keys keep their tag membership and are reported for retry.
    ///
    /// Returns the keys that were swept on full success.
    pub async fn evict_by_tag(&self, tag: &str) -> Result<Vec<String>> {
        let keys = self.tags.keys_for_tag(tag);
        let mut failed = Vec::new();

        for key in &keys {
            if let Err(e) = self.evict(key).await {
                warn!(key = %key, tag, error = %e, "eviction failed during tag sweep");
                failed.push(key.clone());
            }
        }

        if failed.is_empty() {
            self.tags.remove_tag(tag);
            Ok(keys)
        } else {
            Err(Error::EvictionPartialFailure {
                tag: tag.to_string(),
                keys: failed,
            })
        }
    }

    /// Force-refresh: re-invoke the loader chain as if both tiers had
    /// missed, extending freshness before organic expiry. The key's
    /// existing tag membership is preserved.
    pub async fn refresh<F, Fut>(&self, key: &str, opts: EntryOptions, loader: F) -> Result<Bytes>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Bytes>>> + Send + 'static,
    {
        let tags: Vec<String> = self.tags.tags_for_key(key).into_iter().collect();
        let (local_ttl, shared_ttl) = self.resolve_ttls(opts);
        self.metrics.record_refresh();
        self.load_via_guard(key, tags, local_ttl, shared_ttl, loader).await
    }

    async fn load_via_guard<F, Fut>(
        &self,
        key: &str,
        tags: Vec<String>,
        local_ttl: Duration,
        shared_ttl: Duration,
        loader: F,
    ) -> Result<Bytes>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Bytes>>> + Send + 'static,
    {
        let mut rx = match self.guard.acquire(key) {
            Acquired::Leader(rx) => {
                self.spawn_load(key.to_string(), tags, local_ttl, shared_ttl, loader);
                rx
            }
            Acquired::Waiter(rx) => {
                self.metrics.record_stampede_wait();
                rx
            }
        };

        match rx.recv().await {
            Ok(LoadOutcome::Loaded(value)) => Ok(value),
            Ok(LoadOutcome::NotFound) => Err(Error::NotFound(key.to_string())),
            Ok(LoadOutcome::Failed(reason)) => Err(Error::LoadError {
                key: key.to_string(),
                reason,
            }),
            Err(_) => Err(Error::LoadError {
                key: key.to_string(),
                reason: "load task dropped its ticket".into(),
            }),
        }
    }

    /// Run the loader and tier population on a detached task, so a
    /// cancelled caller never cancels the load for the other waiters.
    fn spawn_load<F, Fut>(
        &self,
        key: String,
        tags: Vec<String>,
        local_ttl: Duration,
        shared_ttl: Duration,
        loader: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Bytes>>> + Send + 'static,
    {
        let local = Arc::clone(&self.local);
        let shared = Arc::clone(&self.shared);
        let tag_index = Arc::clone(&self.tags);
        let guard = Arc::clone(&self.guard);
        let metrics = Arc::clone(&self.metrics);
        let negative_caching = self.config.negative_caching;
        let negative_ttl = self.config.negative_ttl;

        tokio::spawn(async move {
            // Held across the whole load: if the loader panics and this
            // task unwinds, dropping the guard still retires the ticket
            // and releases the waiters.
            let completion = CompletionGuard::new(guard, key.clone());

            let outcome = match loader().await {
                Ok(Some(value)) => {
                    metrics.record_load();
                    let tag_set: HashSet<String> = tags.into_iter().collect();
                    let entry = CacheEntry::new(value.clone(), tag_set.clone(), shared_ttl);

                    // Shared write completes before the local write is
                    // applied; a down shared tier degrades to local-only.
                    match shared.set(&key, entry.clone()).await {
                        Ok(()) => {}
                        Err(e) if e.is_degradation() => {
                            metrics.record_shared_unavailable();
                            warn!(key = %key, error = %e, "shared tier write skipped after load");
                        }
                        Err(e) => {
                            completion.finish(LoadOutcome::Failed(e.to_string()));
                            return;
                        }
                    }

                    local.put(key.clone(), entry.for_local(local_ttl));
                    tag_index.replace(&key, &tag_set);
                    LoadOutcome::Loaded(value)
                }
                Ok(None) => {
                    if negative_caching {
                        let tombstone = CacheEntry::tombstone(negative_ttl);
                        match shared.set(&key, tombstone.clone()).await {
                            Ok(()) => {}
                            Err(e) if e.is_degradation() => {
                                metrics.record_shared_unavailable();
                            }
                            Err(e) => {
                                warn!(key = %key, error = %e, "failed to store negative entry");
                            }
                        }
                        local.put(key.clone(), tombstone.for_local(negative_ttl));
                    }
                    LoadOutcome::NotFound
                }
                Err(e) => {
                    metrics.record_load_failure();
                    // Never cached: the ticket is discarded so the next
                    // call retries immediately.
                    LoadOutcome::Failed(e.to_string())
                }
            };

            completion.finish(outcome);
        });
    }

    /// Access tracker feeding the refresh-ahead scheduler
    pub fn tracker(&self) -> &AccessTracker {
        &self.tracker
    }

    /// Tag index view
    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    /// Point-in-time counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
