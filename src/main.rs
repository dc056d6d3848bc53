//! CV PDF export server
//!
//! Serves the export routes, renders accepted jobs in the background and
//! serves the rendered files.
//!
//! ## Architecture
//!
//! - **Routes**: `POST /export-pdf`, `GET /export-pdf/job/{jobId}`, `GET /files/{name}`
//! - **Jobs**: in-memory store or Redis keys (`cv-export:job:{id}`), expired after the TTL
//! - **Renderer**: CV layout to SVG, then svg2pdf, on the blocking pool
//! - **Telemetry**: OpenTelemetry OTLP export
//!
//! ## Configuration
//!
//! Environment variables (each also read with a `CV_EXPORT_` prefix):
//! - `BIND_ADDR`: listen address (default: 0.0.0.0:8080)
//! - `JOB_TTL_SECS`: job record lifetime (default: 600)
//! - `RENDER_TIMEOUT_SECS`: per-render limit (default: 60)
//! - `OUTPUT_DIR`, `PUBLIC_BASE_URL`: where PDFs go and how they are linked
//! - `WORKER_CONCURRENCY`: concurrent renders (default: 4)
//! - `JOB_STORE`: `memory` or `redis`; `REDIS_URL` for the latter
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector endpoint
//! - `RUST_LOG`, `LOG_FORMAT`: log level and format

use anyhow::{Context, Result};
use cv_export::api::{self, ApiState};
use cv_export::config::{Config, StoreBackend};
use cv_export::dispatch::ExportDispatcher;
use cv_export::renderer::{PdfExportWorker, SvgToPdfConverter};
use cv_export::store::{spawn_sweeper, MemoryJobStore, RedisJobStore, SharedJobStore};
use cv_export::telemetry;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // before anything reads RUST_LOG, LOG_FORMAT or OTEL_*
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    if let Err(e) = telemetry::init_telemetry() {
        warn!("Failed to initialize telemetry: {}", e);
    }

    info!("Starting CV export service");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        bind_addr = %config.bind_addr,
        store = %config.store,
        concurrency = config.worker_concurrency,
        job_ttl_secs = config.job_ttl.as_secs(),
        output_dir = %config.output_dir.display(),
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let store: SharedJobStore = match config.store {
        StoreBackend::Memory => Arc::new(MemoryJobStore::new(config.job_ttl)),
        StoreBackend::Redis => {
            let store = RedisJobStore::connect(&config.redis_url, config.job_ttl)
                .await
                .context("Failed to connect to Redis")?;
            info!("Connected to Redis");
            Arc::new(store)
        }
    };

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(store.clone(), config.sweep_interval, shutdown.clone());

    let converter = Arc::new(SvgToPdfConverter::new());
    let renderer = Arc::new(
        PdfExportWorker::new(
            converter,
            config.output_dir.clone(),
            config.public_base_url.clone(),
            config.render_timeout,
        )
        .with_conversion_limit(config.worker_concurrency),
    );
    let dispatcher =
        ExportDispatcher::new(store.clone(), renderer.clone(), config.worker_concurrency);

    let app = api::router(
        ApiState {
            store,
            dispatcher: dispatcher.clone(),
        },
        &config.output_dir,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!("CV export service listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!(
        in_flight = dispatcher.in_flight(),
        "Received shutdown signal, waiting for running exports to finish..."
    );
    shutdown.cancel();
    dispatcher.shutdown().await;
    renderer.wait_idle().await;
    if let Err(e) = sweeper.await {
        error!("Job sweeper panicked: {}", e);
    }

    telemetry::shutdown_telemetry();
    info!("CV export service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
