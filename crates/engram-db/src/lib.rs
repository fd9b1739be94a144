//! # engram-db
//!
//! PostgreSQL database layer for engram.
//!
//! This crate provides:
//! - Connection pool management
//! - The memory repository (duplicate-aware upserts, relations, profiles)
//! - The persisted ingestion queue with lease/stall/cancellation semantics
//! - The asynchronous search job store and query event log
//!
//! ## Example
//!
//! ```rust,ignore
//! use engram_db::Database;
//! use engram_core::{JobRepository, NewCapture, CaptureMetadata};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/engram").await?;
//!
//!     let outcome = db.jobs.enqueue(NewCapture {
//!         user_id: uuid::Uuid::new_v4(),
//!         raw_text: "Captured page text".to_string(),
//!         metadata: CaptureMetadata::default(),
//!     }).await?;
//!
//!     println!("Queued job: {}", outcome.job_id());
//!     Ok(())
//! }
//! ```

pub mod jobs;
pub mod memories;
pub mod pool;
pub mod query_events;
pub mod search_jobs;

// Re-export core types
pub use engram_core::*;

// Re-export repository implementations
pub use jobs::{JobQueueConfig, PgJobRepository};
pub use memories::PgMemoryRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use query_events::PgQueryEventStore;
pub use search_jobs::PgSearchJobStore;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

/// Bundle of repositories sharing one connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
    pub memories: Arc<PgMemoryRepository>,
    pub jobs: Arc<PgJobRepository>,
    pub search_jobs: Arc<PgSearchJobStore>,
    pub query_events: Arc<PgQueryEventStore>,
}

impl Database {
    /// Connect with default pool and queue configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Connect with custom pool and queue configuration.
    pub async fn connect_with(
        database_url: &str,
        pool_config: PoolConfig,
        queue_config: JobQueueConfig,
    ) -> Result<Self> {
        let pool = create_pool_with_config(database_url, pool_config).await?;
        Ok(Self::from_pool_with_queue(pool, queue_config))
    }

    /// Build the repository bundle around an existing pool.
    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self::from_pool_with_queue(pool, JobQueueConfig::default())
    }

    /// Build the repository bundle with a custom queue configuration.
    pub fn from_pool_with_queue(pool: Pool<Postgres>, queue_config: JobQueueConfig) -> Self {
        Self {
            memories: Arc::new(PgMemoryRepository::new(pool.clone())),
            jobs: Arc::new(PgJobRepository::with_config(pool.clone(), queue_config)),
            search_jobs: Arc::new(PgSearchJobStore::new(pool.clone())),
            query_events: Arc::new(PgQueryEventStore::new(pool.clone())),
            pool,
        }
    }

    /// Access the underlying connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Apply pending schema migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}
