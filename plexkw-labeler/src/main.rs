//! plexkw-labeler - Plex keyword label enrichment service
//!
//! Listens for Plex `library.new` webhooks, looks up the title's IMDb plot
//! keywords in the background and writes them to Plex as labels.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use plexkw_common::config::{PartialSettings, Settings};
use plexkw_common::logging::init_tracing;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use plexkw_labeler::services::{
    HealthChecker, ImdbClient, LruKeywordCache, PlexClient, SlidingRateWindow,
};
use plexkw_labeler::workflow::{EnrichmentTask, JobQueue, JobRunner, RetryPolicy};
use plexkw_labeler::AppState;

/// Command-line arguments for plexkw-labeler
///
/// Every option falls back to its environment variable, then the TOML file,
/// then the compiled default.
#[derive(Parser, Debug)]
#[command(name = "plexkw-labeler")]
#[command(about = "Plex webhook service that labels movies with IMDb keywords")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "PLEXKW_CONFIG")]
    config: Option<PathBuf>,

    /// Plex server base URL
    #[arg(long)]
    plex_url: Option<String>,

    /// Plex access token
    #[arg(long)]
    plex_token: Option<String>,

    /// Task queue database URL
    #[arg(long)]
    broker_url: Option<String>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// IMDb base URL
    #[arg(long)]
    imdb_base_url: Option<String>,

    /// Number of enrichment workers
    #[arg(long)]
    workers: Option<usize>,

    /// Attempts per job, including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Delay between attempts, in seconds
    #[arg(long)]
    retry_delay_secs: Option<u64>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: pretty or json
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    fn into_partial(self) -> (PartialSettings, Option<PathBuf>) {
        let partial = PartialSettings {
            plex_url: self.plex_url,
            plex_token: self.plex_token,
            broker_url: self.broker_url,
            host: self.host,
            port: self.port,
            imdb_base_url: self.imdb_base_url,
            workers: self.workers,
            max_attempts: self.max_attempts,
            retry_delay_secs: self.retry_delay_secs,
            log_level: self.log_level,
            log_format: self.log_format,
        };
        (partial, self.config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (cli, config_path) = Args::parse().into_partial();

    let settings = Settings::load(cli, config_path.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&settings.log_level, settings.log_format)
        .context("Failed to initialize logging")?;

    info!("Starting plexkw-labeler");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Plex server: {}", settings.plex_url);

    let db_pool = plexkw_labeler::db::init_database_pool(&settings.broker_url)
        .await
        .context("Failed to open task queue database")?;
    info!("Task queue database: {}", settings.broker_url);

    let imdb = ImdbClient::new(
        &settings.imdb_base_url,
        Arc::new(SlidingRateWindow::default()),
        Arc::new(LruKeywordCache::default()),
    )
    .context("Failed to create IMDb client")?;

    let plex = Arc::new(
        PlexClient::new(&settings.plex_url, &settings.plex_token)
            .context("Failed to create Plex client")?,
    );

    let policy = RetryPolicy {
        max_attempts: settings.max_attempts,
        retry_delay: settings.retry_delay,
    };

    let queue = JobQueue::new(db_pool.clone());
    let task = EnrichmentTask::new(Arc::new(imdb), plex.clone());
    let runner = Arc::new(JobRunner::new(queue.clone(), task, policy));

    runner
        .recover()
        .await
        .context("Failed to recover interrupted jobs")?;

    let cancel = CancellationToken::new();
    let workers = runner.spawn_workers(settings.workers, cancel.clone());
    info!("Started {} enrichment workers", settings.workers);

    let health = Arc::new(HealthChecker::new(queue.clone(), plex));
    let state = AppState::new(queue, health, policy);
    let app = plexkw_labeler::build_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", settings.host, settings.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "Enrichment worker ended abnormally");
        }
    }
    db_pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
