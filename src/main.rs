//! StrataCache - Two-Tier Caching Service
//!
//! Process wiring for the engine: configuration, logging, the
//! refresh-ahead scheduler, and the HTTP boundary.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stratacache::api::{self, ApiState};
use stratacache::cache::{
    CacheEngine, EngineConfig, InMemorySharedTier, RefreshScheduler, SchedulerConfig,
};
use stratacache::error::Result;
use stratacache::store::InMemoryRecordStore;

// =============================================================================
// CLI Arguments
// =============================================================================

/// StrataCache - two-tier caching service with tag invalidation and
/// refresh-ahead
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API server bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Local-tier entry lifetime in seconds
    #[arg(long, env = "LOCAL_TTL_SECS", default_value = "1800")]
    local_ttl_secs: u64,

    /// Shared-tier entry lifetime in seconds
    #[arg(long, env = "SHARED_TTL_SECS", default_value = "86400")]
    shared_ttl_secs: u64,

    /// Refresh-ahead sweep period in seconds
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value = "600")]
    refresh_interval_secs: u64,

    /// Keys refreshed per sweep
    #[arg(long, env = "HOT_SET_SIZE", default_value = "5")]
    hot_set_size: usize,

    /// Cache loader misses briefly as tombstones
    #[arg(long, env = "NEGATIVE_CACHING")]
    negative_caching: bool,

    /// Tombstone lifetime in seconds when negative caching is on
    #[arg(long, env = "NEGATIVE_TTL_SECS", default_value = "5")]
    negative_ttl_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting StrataCache");
    info!("  Listen address: {}", args.listen_addr);
    info!("  Local TTL: {}s", args.local_ttl_secs);
    info!("  Shared TTL: {}s", args.shared_ttl_secs);
    info!("  Refresh interval: {}s", args.refresh_interval_secs);
    info!("  Hot set size: {}", args.hot_set_size);
    info!("  Negative caching: {}", args.negative_caching);

    let store = Arc::new(InMemoryRecordStore::new());
    let shared = Arc::new(InMemorySharedTier::new());

    let engine = Arc::new(CacheEngine::new(
        shared,
        EngineConfig {
            local_ttl: Duration::from_secs(args.local_ttl_secs),
            shared_ttl: Duration::from_secs(args.shared_ttl_secs),
            negative_caching: args.negative_caching,
            negative_ttl: Duration::from_secs(args.negative_ttl_secs),
        },
    ));

    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&engine),
        api::record_loader(store.clone()),
        SchedulerConfig {
            interval: Duration::from_secs(args.refresh_interval_secs),
            hot_set_size: args.hot_set_size,
        },
    ));
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run());

    let state = Arc::new(ApiState::new(engine, store));

    tokio::select! {
        result = api::run_server(&args.listen_addr, state) => {
            if let Err(e) = result {
                error!("API server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    // The scheduler exits between sweeps; an in-flight sweep completes
    // before the task finishes.
    scheduler.shutdown();
    let _ = scheduler_handle.await;

    info!("StrataCache stopped");
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level))
        .add_directive("hyper=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
