//! Memory repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use engram_core::{
    new_v7, CreateMemoryRequest, Error, ExtractedMetadata, Memory, MemoryRepository, MemoryUpsert,
    NewCapture, Result,
};

/// PostgreSQL implementation of MemoryRepository.
pub struct PgMemoryRepository {
    pool: Pool<Postgres>,
}

impl PgMemoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    const MEMORY_COLUMNS: &'static str = "id, user_id, content, canonical_hash, url, title, \
         summary, memory_type, source, metadata, importance_score, created_at, updated_at";

    fn parse_memory_row(row: PgRow) -> Memory {
        let metadata: serde_json::Value = row.get("metadata");
        Memory {
            id: row.get("id"),
            user_id: row.get("user_id"),
            content: row.get("content"),
            canonical_hash: row.get("canonical_hash"),
            url: row.get("url"),
            title: row.get("title"),
            summary: row.get("summary"),
            memory_type: row.get("memory_type"),
            source: row.get("source"),
            metadata: serde_json::from_value::<ExtractedMetadata>(metadata).unwrap_or_default(),
            importance_score: row.get("importance_score"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl MemoryRepository for PgMemoryRepository {
    async fn insert(&self, req: CreateMemoryRequest) -> Result<MemoryUpsert> {
        let id = new_v7();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO memory
                 (id, user_id, content, canonical_hash, url, title, memory_type, source,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)",
        )
        .bind(id)
        .bind(req.user_id)
        .bind(&req.content)
        .bind(&req.canonical_hash)
        .bind(&req.url)
        .bind(&req.title)
        .bind(&req.memory_type)
        .bind(&req.source)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(MemoryUpsert::Created(id)),
            Err(e) => {
                // Duplicate-create race: another worker landed the same
                // canonical hash first. Re-read and merge rather than error.
                let is_unique = e
                    .as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false);
                if !is_unique {
                    return Err(Error::Database(e));
                }

                let existing = self
                    .find_by_hash(req.user_id, &req.canonical_hash)
                    .await?
                    .ok_or_else(|| {
                        Error::Internal(
                            "unique violation but no conflicting memory row".to_string(),
                        )
                    })?;

                tracing::debug!(
                    subsystem = "db",
                    component = "memories",
                    memory_id = %existing.id,
                    "Duplicate-create race resolved by merge"
                );
                Ok(MemoryUpsert::Merged(existing.id))
            }
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<Memory> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memory WHERE id = $1",
            Self::MEMORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_memory_row)
            .ok_or(Error::MemoryNotFound(id))
    }

    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Memory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM memory WHERE id = ANY($1)",
            Self::MEMORY_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut by_id: std::collections::HashMap<Uuid, Memory> = rows
            .into_iter()
            .map(Self::parse_memory_row)
            .map(|m| (m.id, m))
            .collect();

        // Preserve the caller's ordering (ranked candidates).
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn find_by_hash(&self, user_id: Uuid, canonical_hash: &str) -> Result<Option<Memory>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memory WHERE user_id = $1 AND canonical_hash = $2",
            Self::MEMORY_COLUMNS
        ))
        .bind(user_id)
        .bind(canonical_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_memory_row))
    }

    async fn merge_capture(&self, memory_id: Uuid, capture: &NewCapture) -> Result<()> {
        sqlx::query(
            "UPDATE memory
             SET updated_at = $1,
                 url = COALESCE(url, $2),
                 title = COALESCE(title, $3)
             WHERE id = $4",
        )
        .bind(Utc::now())
        .bind(&capture.metadata.url)
        .bind(&capture.metadata.title)
        .bind(memory_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: Uuid,
        metadata: &ExtractedMetadata,
        summary: Option<&str>,
    ) -> Result<()> {
        let metadata_json = serde_json::to_value(metadata)?;
        let importance = metadata.importance.unwrap_or(0.5).clamp(0.0, 1.0);

        sqlx::query(
            "UPDATE memory
             SET metadata = $1, summary = COALESCE($2, summary),
                 importance_score = $3, updated_at = $4
             WHERE id = $5",
        )
        .bind(metadata_json)
        .bind(summary)
        .bind(importance)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM memory WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(ids)
    }

    async fn corpus_size(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memory WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    async fn related_ids(&self, memory_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT related_id FROM memory_relation WHERE memory_id = $1")
                .bind(memory_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(ids)
    }

    async fn set_related(&self, memory_id: Uuid, related: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM memory_relation WHERE memory_id = $1")
            .bind(memory_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for related_id in related {
            if *related_id == memory_id {
                continue;
            }
            sqlx::query(
                "INSERT INTO memory_relation (memory_id, related_id)
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(memory_id)
            .bind(related_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<String>> {
        let summary: Option<String> =
            sqlx::query_scalar("SELECT summary FROM user_profile WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(summary)
    }

    async fn store_profile(&self, user_id: Uuid, summary: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_profile (user_id, summary, updated_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id) DO UPDATE SET summary = $2, updated_at = $3",
        )
        .bind(user_id)
        .bind(summary)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
