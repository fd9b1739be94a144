//! Asynchronous search job store.
//!
//! Job records are short-lived: created when a search is dispatched
//! asynchronously, updated at most a few times, polled by the caller,
//! and expired via TTL. There is no push notification.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use engram_core::{
    defaults, new_v7, Citation, Error, Result, SearchJob, SearchJobStatus, SearchJobStore,
    SearchResultItem,
};

/// PostgreSQL implementation of SearchJobStore.
pub struct PgSearchJobStore {
    pool: Pool<Postgres>,
    ttl_secs: i64,
}

impl PgSearchJobStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            ttl_secs: defaults::SEARCH_JOB_TTL_SECS,
        }
    }

    /// Override the record TTL (seconds).
    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    fn status_to_str(status: SearchJobStatus) -> &'static str {
        match status {
            SearchJobStatus::Pending => "pending",
            SearchJobStatus::Processing => "processing",
            SearchJobStatus::Completed => "completed",
            SearchJobStatus::Failed => "failed",
        }
    }

    fn str_to_status(s: &str) -> SearchJobStatus {
        match s {
            "pending" => SearchJobStatus::Pending,
            "processing" => SearchJobStatus::Processing,
            "completed" => SearchJobStatus::Completed,
            "failed" => SearchJobStatus::Failed,
            _ => SearchJobStatus::Pending, // fallback
        }
    }

    fn parse_row(row: PgRow) -> SearchJob {
        let results: Option<serde_json::Value> = row.get("results");
        let citations: Option<serde_json::Value> = row.get("citations");
        SearchJob {
            id: row.get("id"),
            user_id: row.get("user_id"),
            query: row.get("query"),
            status: Self::str_to_status(row.get("status")),
            results: results.and_then(|v| serde_json::from_value(v).ok()),
            answer: row.get("answer"),
            citations: citations.and_then(|v| serde_json::from_value(v).ok()),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        }
    }
}

#[async_trait]
impl SearchJobStore for PgSearchJobStore {
    async fn create(&self, user_id: Uuid, query: &str) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        let expires_at = now + ChronoDuration::seconds(self.ttl_secs);

        sqlx::query(
            "INSERT INTO search_job (id, user_id, query, status, created_at, expires_at)
             VALUES ($1, $2, $3, 'pending'::search_job_status, $4, $5)",
        )
        .bind(id)
        .bind(user_id)
        .bind(query)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE search_job SET status = 'processing'::search_job_status
             WHERE id = $1 AND status = 'pending'::search_job_status",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        results: &[SearchResultItem],
        answer: Option<&str>,
        citations: &[Citation],
    ) -> Result<()> {
        let results_json = serde_json::to_value(results)?;
        let citations_json = serde_json::to_value(citations)?;

        sqlx::query(
            "UPDATE search_job
             SET status = 'completed'::search_job_status,
                 results = $1, answer = $2, citations = $3
             WHERE id = $4",
        )
        .bind(results_json)
        .bind(answer)
        .bind(citations_json)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE search_job
             SET status = 'failed'::search_job_status, error_message = $1
             WHERE id = $2",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SearchJob>> {
        let row = sqlx::query(
            "SELECT id, user_id, query, status::text, results, answer, citations,
                    error_message, created_at, expires_at
             FROM search_job
             WHERE id = $1 AND expires_at > now()",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn purge_expired(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM search_job WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() as i64)
    }
}
