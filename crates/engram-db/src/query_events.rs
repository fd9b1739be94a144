//! Query event log.
//!
//! A low-cardinality record of which memories each query returned, kept
//! for relevance feedback. Recorded even when a query returns nothing.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use engram_core::{new_v7, Error, QueryEventStore, Result};

/// PostgreSQL implementation of QueryEventStore.
pub struct PgQueryEventStore {
    pool: Pool<Postgres>,
}

impl PgQueryEventStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryEventStore for PgQueryEventStore {
    async fn record(&self, user_id: Uuid, query: &str, returned: &[Uuid]) -> Result<()> {
        sqlx::query(
            "INSERT INTO query_event (id, user_id, query, memory_ids, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(new_v7())
        .bind(user_id)
        .bind(query)
        .bind(returned)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
