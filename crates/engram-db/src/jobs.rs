//! Ingestion job queue repository.
//!
//! The queue is persisted in PostgreSQL and shared by every worker
//! process. Claims take a lease via `FOR UPDATE SKIP LOCKED`; leases are
//! renewed while a job runs, and jobs whose lease lapses are recovered
//! by the stall sweep — unless their cancellation flag shows they were
//! deliberately cancelled, in which case they are discarded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use similar::TextDiff;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tokio::sync::Notify;
use uuid::Uuid;

use engram_core::{
    canonicalize, defaults, new_v7, normalize_url, CaptureMetadata, EnqueueOutcome, Error, Job,
    JobRepository, JobStatus, NewCapture, QueueStats, Result,
};

/// Tunables for queue behavior. The similarity threshold is hand-tuned
/// and kept configurable pending calibration against labeled duplicates.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Word-similarity above which same-URL captures are duplicates.
    pub similarity_threshold: f64,
    /// Lease granted on claim (seconds).
    pub lease_secs: i64,
    /// Grace past lease expiry before a job counts as stalled (seconds).
    pub stall_after_secs: i64,
    /// Backoff before a retried job becomes claimable (seconds).
    pub retry_delay_secs: i64,
    /// Retry budget per job.
    pub max_retries: i32,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: defaults::QUEUE_SIMILARITY_THRESHOLD,
            lease_secs: defaults::JOB_LEASE_SECS,
            stall_after_secs: defaults::JOB_STALL_AFTER_SECS,
            retry_delay_secs: defaults::JOB_RETRY_DELAY_SECS,
            max_retries: defaults::JOB_MAX_RETRIES,
        }
    }
}

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    config: JobQueueConfig,
    /// Notify handle for event-driven worker wake.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    /// Create a repository with default queue configuration.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_config(pool, JobQueueConfig::default())
    }

    /// Create a repository with custom queue configuration.
    pub fn with_config(pool: Pool<Postgres>, config: JobQueueConfig) -> Self {
        Self {
            pool,
            config,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    #[allow(dead_code)]
    fn status_to_str(status: JobStatus) -> &'static str {
        match status {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Delayed => "delayed",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    fn str_to_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "delayed" => JobStatus::Delayed,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Pending, // fallback
        }
    }

    fn parse_job_row(row: PgRow) -> Job {
        let metadata: serde_json::Value = row.get("metadata");
        Job {
            id: row.get("id"),
            user_id: row.get("user_id"),
            raw_text: row.get("raw_text"),
            canonical_hash: row.get("canonical_hash"),
            normalized_url: row.get("normalized_url"),
            metadata: serde_json::from_value::<CaptureMetadata>(metadata).unwrap_or_default(),
            status: Self::str_to_status(row.get("status")),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            cancel_requested: row.get("cancel_requested"),
            lease_expires_at: row.get("lease_expires_at"),
            run_at: row.get("run_at"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }

    const JOB_COLUMNS: &'static str = "id, user_id, raw_text, canonical_hash, normalized_url, \
         metadata, status::text, error_message, retry_count, max_retries, cancel_requested, \
         lease_expires_at, run_at, created_at, started_at, completed_at";

    /// Word-level similarity between two canonical texts, in [0, 1].
    fn text_similarity(a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        TextDiff::from_words(a, b).ratio() as f64
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(&self, capture: NewCapture) -> Result<EnqueueOutcome> {
        if capture.raw_text.trim().is_empty() {
            return Err(Error::InvalidInput("capture text is empty".to_string()));
        }

        let canonical = canonicalize(&capture.raw_text);
        let normalized_url = capture
            .metadata
            .url
            .as_deref()
            .and_then(normalize_url);

        // Scan the user's in-flight jobs for an equivalent capture. The
        // window is small (one user's pending work), so the similarity
        // pass stays in-process.
        let pending = sqlx::query(
            "SELECT id, raw_text, canonical_hash, normalized_url FROM ingest_job
             WHERE user_id = $1
               AND status IN ('pending'::ingest_status, 'running'::ingest_status, 'delayed'::ingest_status)
             ORDER BY created_at ASC",
        )
        .bind(capture.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        for row in &pending {
            let existing_hash: String = row.get("canonical_hash");
            if existing_hash == canonical.canonical_hash {
                let id: Uuid = row.get("id");
                tracing::debug!(
                    subsystem = "db",
                    component = "job_queue",
                    job_id = %id,
                    "Exact-hash duplicate suppressed at enqueue"
                );
                return Ok(EnqueueOutcome::Duplicate(id));
            }
        }

        if let Some(ref url) = normalized_url {
            for row in &pending {
                let existing_url: Option<String> = row.get("normalized_url");
                if existing_url.as_deref() != Some(url.as_str()) {
                    continue;
                }
                let existing_text: String = row.get("raw_text");
                let existing_canonical = canonicalize(&existing_text);
                let similarity = Self::text_similarity(
                    &canonical.canonical_text,
                    &existing_canonical.canonical_text,
                );
                if similarity > self.config.similarity_threshold {
                    let id: Uuid = row.get("id");
                    tracing::debug!(
                        subsystem = "db",
                        component = "job_queue",
                        job_id = %id,
                        similarity,
                        "Near-duplicate (same URL) suppressed at enqueue"
                    );
                    return Ok(EnqueueOutcome::Duplicate(id));
                }
            }
        }

        let job_id = new_v7();
        let metadata = serde_json::to_value(&capture.metadata)?;

        sqlx::query(
            "INSERT INTO ingest_job
                 (id, user_id, raw_text, canonical_hash, normalized_url, metadata,
                  status, max_retries, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, 'pending'::ingest_status, $7, $8)",
        )
        .bind(job_id)
        .bind(capture.user_id)
        .bind(&capture.raw_text)
        .bind(&canonical.canonical_hash)
        .bind(&normalized_url)
        .bind(&metadata)
        .bind(self.config.max_retries)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.notify.notify_waiters();
        Ok(EnqueueOutcome::Queued(job_id))
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let now = Utc::now();
        let lease = now + ChronoDuration::seconds(self.config.lease_secs);

        let row = sqlx::query(&format!(
            "UPDATE ingest_job
             SET status = 'running'::ingest_status, started_at = $1, lease_expires_at = $2
             WHERE id = (
                 SELECT id FROM ingest_job
                 WHERE status = 'pending'::ingest_status
                    OR (status = 'delayed'::ingest_status AND run_at <= $1)
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            Self::JOB_COLUMNS
        ))
        .bind(now)
        .bind(lease)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn renew_lease(&self, job_id: Uuid) -> Result<()> {
        let lease = Utc::now() + ChronoDuration::seconds(self.config.lease_secs);
        sqlx::query(
            "UPDATE ingest_job SET lease_expires_at = $1
             WHERE id = $2 AND status = 'running'::ingest_status",
        )
        .bind(lease)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_job
             SET status = 'completed'::ingest_status, completed_at = $1, lease_expires_at = NULL
             WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) =
            sqlx::query_as("SELECT retry_count, max_retries FROM ingest_job WHERE id = $1")
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        if retry_count < max_retries {
            // Retry: delay, clear the lease, keep the error for operators.
            let run_at = now + ChronoDuration::seconds(self.config.retry_delay_secs);
            sqlx::query(
                "UPDATE ingest_job
                 SET status = 'delayed'::ingest_status, retry_count = $1, error_message = $2,
                     run_at = $3, started_at = NULL, lease_expires_at = NULL
                 WHERE id = $4",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(run_at)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            sqlx::query(
                "UPDATE ingest_job
                 SET status = 'failed'::ingest_status, completed_at = $1, error_message = $2,
                     lease_expires_at = NULL
                 WHERE id = $3",
            )
            .bind(now)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn request_cancel(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ingest_job SET cancel_requested = true
             WHERE id = $1
               AND status IN ('pending'::ingest_status, 'running'::ingest_status, 'delayed'::ingest_status)",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_cancel_requested(&self, job_id: Uuid) -> Result<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT cancel_requested FROM ingest_job WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(flag.unwrap_or(false))
    }

    async fn mark_cancelled(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_job
             SET status = 'cancelled'::ingest_status, completed_at = $1, lease_expires_at = NULL
             WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn recover_stalled(&self) -> Result<i64> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.config.stall_after_secs);

        // Deliberately-cancelled stalled jobs are discarded, not retried.
        let discarded = sqlx::query(
            "UPDATE ingest_job
             SET status = 'cancelled'::ingest_status, completed_at = now(), lease_expires_at = NULL
             WHERE status = 'running'::ingest_status
               AND lease_expires_at < $1
               AND cancel_requested",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        let recovered = sqlx::query(
            "UPDATE ingest_job
             SET status = 'pending'::ingest_status, started_at = NULL, lease_expires_at = NULL
             WHERE status = 'running'::ingest_status
               AND lease_expires_at < $1
               AND NOT cancel_requested",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if discarded > 0 || recovered > 0 {
            tracing::info!(
                subsystem = "db",
                component = "job_queue",
                recovered,
                discarded,
                "Stalled job sweep"
            );
            if recovered > 0 {
                self.notify.notify_waiters();
            }
        }

        Ok(recovered as i64)
    }

    async fn cleanup(&self) -> Result<i64> {
        // Only completed jobs are removed; running/pending/delayed/failed
        // rows stay visible for observability and retry.
        let result = sqlx::query("DELETE FROM ingest_job WHERE status = 'completed'::ingest_status")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() as i64)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ingest_job WHERE id = $1",
            Self::JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'running') as running,
                COUNT(*) FILTER (WHERE status = 'delayed') as delayed,
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '1 hour') as completed_last_hour,
                COUNT(*) FILTER (WHERE status = 'failed' AND completed_at > NOW() - INTERVAL '1 hour') as failed_last_hour,
                COUNT(*) as total
             FROM ingest_job",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            running: row.get::<i64, _>("running"),
            delayed: row.get::<i64, _>("delayed"),
            completed_last_hour: row.get::<i64, _>("completed_last_hour"),
            failed_last_hour: row.get::<i64, _>("failed_last_hour"),
            total: row.get::<i64, _>("total"),
        })
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ingest_job
             WHERE status = 'pending'::ingest_status
                OR (status = 'delayed'::ingest_status AND run_at <= now())",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }
}
