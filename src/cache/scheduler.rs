//! Refresh-Ahead Scheduler
//!
//! Periodic background sweep that asks the access tracker for the
//! hottest keys and force-refreshes them through the engine before they
//! expire organically. Loader failures are logged and skipped; the key
//! simply expires naturally later. Counters are reset after every sweep
//! so each window observes fresh traffic.
//!
//! The loop is cancellable: the shutdown signal is only observed
//! between sweeps, never mid-sweep, so an in-flight refresh always
//! completes cleanly before the task exits.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::engine::{CacheEngine, EntryOptions};
use crate::error::Result;

/// Produces the loader future for a key being refreshed
pub type RefreshLoader =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Option<Bytes>>> + Send + Sync>;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sweep period
    pub interval: Duration,
    /// Number of hot keys refreshed per sweep
    pub hot_set_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            hot_set_size: 5,
        }
    }
}

/// Periodic hot-key refresher
pub struct RefreshScheduler {
    engine: Arc<CacheEngine>,
    loader: RefreshLoader,
    config: SchedulerConfig,
    shutdown: Notify,
}

impl RefreshScheduler {
    /// Create a new scheduler over the engine
    pub fn new(engine: Arc<CacheEngine>, loader: RefreshLoader, config: SchedulerConfig) -> Self {
        Self {
            engine,
            loader,
            config,
            shutdown: Notify::new(),
        }
    }

    /// Run the periodic loop until [`shutdown`](Self::shutdown) is signalled
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            hot_set_size = self.config.hot_set_size,
            "starting refresh-ahead scheduler"
        );

        let mut tick = interval(self.config.interval);
        // The first tick fires immediately; the tracker is empty then,
        // so the initial sweep is a no-op.
        loop {
            // A sweep in progress is never raced against the shutdown
            // signal; the signal is only consulted between sweeps.
            tokio::select! {
                _ = tick.tick() => {
                    let refreshed = self.sweep_once().await;
                    debug!(refreshed, "refresh-ahead sweep complete");
                }
                _ = self.shutdown.notified() => {
                    info!("refresh-ahead scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// One sweep: refresh the current hot set, then reset the counters.
    /// Returns how many keys were successfully refreshed.
    ///
    /// The hot set is deterministic for a given set of counts (count
    /// descending, lexical key order on ties), so sweeps are
    /// reproducible.
    pub async fn sweep_once(&self) -> usize {
        let hot = self.engine.tracker().top_n(self.config.hot_set_size);
        let mut refreshed = 0;

        for key in hot {
            let loader = Arc::clone(&self.loader);
            let load_key = key.clone();
            let result = self
                .engine
                .refresh(&key, EntryOptions::default(), move || loader(load_key))
                .await;

            match result {
                Ok(_) => {
                    debug!(key = %key, "refreshed hot key");
                    refreshed += 1;
                }
                // Non-fatal: the key expires naturally later.
                Err(e) => warn!(key = %key, error = %e, "refresh-ahead skipped key"),
            }
        }

        self.engine.tracker().reset_all();
        refreshed
    }

    /// Signal the loop to stop. A sweep already in progress completes
    /// before the loop exits; the stored permit also covers a signal
    /// that arrives mid-sweep or before the loop starts.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

// =============================================================================
// Tests
// =============================================================================
