//! sixhop-accel: prefetching cache proxy for the Wiki SixHop game.
//!
//! Sits between the game page and the upstream server. The cache worker
//! answers proxied requests under cache-first / stale-while-revalidate /
//! network-first policies; the prefetch controller warms the game-data
//! cache from page events before the user clicks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use sixhop_accel::config::{Cli, Config};
use sixhop_accel::fetch::{Fetcher, HttpFetcher};
use sixhop_accel::prefetch::controller::Prefetcher;
use sixhop_accel::server::api::{build_router, AppState};
use sixhop_accel::worker::lifecycle::CacheWorker;
use sixhop_accel::worker::store::CacheStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "sixhop_accel=debug,tower_http=debug"
    } else {
        "sixhop_accel=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("sixhop-accel v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(upstream) = cli.upstream {
        config.server.upstream = upstream;
    }
    let config = Arc::new(config);

    info!(
        upstream = %config.server.upstream,
        static_partition = %config.cache.static_partition,
        api_partition = %config.cache.api_partition,
        "Configuration loaded"
    );

    info!(
        max_concurrent = config.prefetch.max_concurrent,
        debounce_ms = config.prefetch.hover_debounce_ms,
        fetch_timeout_ms = config.prefetch.fetch_timeout_ms,
        eager_limit = config.prefetch.eager_prefetch_limit,
        "Prefetch tuning"
    );

    // One upstream fetcher shared by the worker and the prefetcher.
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
        &config.server.upstream,
        Duration::from_secs(config.server.request_timeout_secs),
    )?);

    // Bring up the cache worker. Install/activate failures are logged and
    // never surfaced: until the worker is active, requests pass through.
    let storage = Arc::new(CacheStorage::new());
    let worker = Arc::new(CacheWorker::new(
        config.cache.clone(),
        storage,
        fetcher.clone(),
    ));
    match worker.install().await {
        Ok(()) => {
            if let Err(err) = worker.activate().await {
                warn!(error = %err, "Worker activation failed");
            }
        }
        Err(err) => warn!(error = %err, "Worker install failed, proxying uncached"),
    }

    // Start the prefetch controller.
    let prefetcher = Prefetcher::new(config.prefetch.clone(), fetcher);
    prefetcher.start().await;

    // Build application state and the router.
    let state = Arc::new(AppState {
        worker,
        prefetcher,
        config: config.clone(),
        start_time: Instant::now(),
    });
    let app = build_router(state);

    // Start the server.
    let listen_addr = cli.listen;
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
