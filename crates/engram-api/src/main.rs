//! Engram HTTP API server.
//!
//! Wires the injected dependency graph at process start — database,
//! inference backends, vector index, cache — then serves the capture
//! and search endpoints while the ingestion worker drains the queue in
//! the background.

mod handlers;
mod query_types;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use engram_core::{Embedder, Generator, JobRepository, KeyValueCache, SearchJobStore, VectorIndex};
use engram_db::Database;
use engram_inference::OllamaBackend;
use engram_ingest::{CaptureProcessor, IngestWorker, WorkerConfig};
use engram_search::{HttpVectorIndex, SearchPipeline};

use services::RedisCache;

/// Interval between expired search-job purges (seconds).
const SEARCH_JOB_PURGE_SECS: u64 = 60;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobRepository>,
    pub search_jobs: Arc<dyn SearchJobStore>,
    pub pipeline: Arc<SearchPipeline>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(dir) = std::env::var("ENGRAM_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "engram-api.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // The guard flushes the writer on drop; it must live as long as
        // the process.
        std::mem::forget(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn health() -> &'static str {
    "ok"
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/captures", post(handlers::captures::enqueue_capture))
        .route("/api/captures/:id", get(handlers::captures::capture_status))
        .route(
            "/api/captures/:id/cancel",
            post(handlers::captures::cancel_capture),
        )
        .route("/api/search", post(handlers::search::search))
        .route("/api/search/jobs/:id", get(handlers::search::get_search_job))
        .route("/api/jobs/stats", get(handlers::jobs::queue_stats))
        .route("/api/jobs/cleanup", post(handlers::jobs::cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/engram".to_string());
    let db = Database::connect_with(
        &database_url,
        engram_db::PoolConfig::from_env(),
        engram_db::JobQueueConfig::default(),
    )
    .await?;
    db.migrate().await?;

    let embedder: Arc<dyn Embedder> = Arc::new(OllamaBackend::from_env());
    let generator: Option<Arc<dyn Generator>> = if std::env::var("ENGRAM_GENERATION_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true)
    {
        Some(Arc::new(OllamaBackend::from_env()))
    } else {
        warn!("Generation backend disabled; searches will be context-only capable");
        None
    };
    let vector_index: Arc<dyn VectorIndex> = Arc::new(HttpVectorIndex::from_env());
    let cache: Arc<dyn KeyValueCache> = Arc::new(RedisCache::from_env().await);

    let pipeline = Arc::new(SearchPipeline::new(
        db.memories.clone(),
        db.query_events.clone(),
        vector_index.clone(),
        embedder.clone(),
        generator.clone(),
        cache,
    ));

    let processor = CaptureProcessor::new(
        db.memories.clone(),
        embedder,
        generator,
        vector_index,
    );
    let worker = IngestWorker::new(db.jobs.clone(), processor, WorkerConfig::from_env());
    let worker_handle = worker.start();

    // Expired async search jobs are purged on a fixed cadence; failures
    // here are logged and retried next round.
    let purge_store = db.search_jobs.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SEARCH_JOB_PURGE_SECS));
        loop {
            interval.tick().await;
            match purge_store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Purged expired search jobs"),
                Err(e) => error!(error = %e, "Search job purge failed"),
            }
        }
    });

    let state = AppState {
        jobs: db.jobs.clone(),
        search_jobs: db.search_jobs.clone(),
        pipeline,
    };

    let addr: SocketAddr = std::env::var("ENGRAM_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8701".to_string())
        .parse()?;
    info!(%addr, "Engram API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    if let Err(e) = worker_handle.shutdown().await {
        warn!(error = %e, "Worker shutdown signal failed");
    }

    Ok(())
}
