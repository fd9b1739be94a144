//! HTTP client for the external vector-similarity store.
//!
//! Thin wrapper over a Qdrant-compatible points API. Searches are
//! always scoped by an explicit allow-list of the user's memory ids;
//! defining or tuning the index itself is out of scope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use engram_core::{defaults, Error, Result, VectorHit, VectorIndex};

/// Default vector store endpoint.
pub const DEFAULT_VECTOR_URL: &str = "http://localhost:6333";

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "engram_memories";

/// Default request timeout (seconds).
pub const VECTOR_TIMEOUT_SECS: u64 = 15;

/// Configuration for the vector index client.
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub base_url: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_VECTOR_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            api_key: None,
            timeout_secs: VECTOR_TIMEOUT_SECS,
        }
    }
}

impl VectorIndexConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VECTOR_INDEX_URL` | `http://localhost:6333` |
    /// | `VECTOR_INDEX_COLLECTION` | `engram_memories` |
    /// | `VECTOR_INDEX_API_KEY` | unset |
    /// | `VECTOR_INDEX_TIMEOUT_SECS` | `15` |
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VECTOR_INDEX_URL")
                .unwrap_or_else(|_| DEFAULT_VECTOR_URL.to_string()),
            collection: std::env::var("VECTOR_INDEX_COLLECTION")
                .unwrap_or_else(|_| DEFAULT_COLLECTION.to_string()),
            api_key: std::env::var("VECTOR_INDEX_API_KEY").ok(),
            timeout_secs: std::env::var("VECTOR_INDEX_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(VECTOR_TIMEOUT_SECS),
        }
    }
}

/// HTTP implementation of [`VectorIndex`].
pub struct HttpVectorIndex {
    client: Client,
    config: VectorIndexConfig,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchPoint>,
}

#[derive(Deserialize)]
struct SearchPoint {
    id: Uuid,
    score: f32,
}

impl HttpVectorIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }

    pub fn from_env() -> Self {
        Self::new(VectorIndexConfig::from_env())
    }

    fn points_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}/points{}",
            self.config.base_url, self.config.collection, suffix
        )
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    fn map_error(op: &'static str, secs: u64, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout { op, secs }
        } else {
            Error::Search(format!("{op} request failed: {e}"))
        }
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    #[instrument(skip(self, vector), fields(subsystem = "search", component = "vector_index", op = "upsert", memory_id = %memory_id))]
    async fn upsert(&self, memory_id: Uuid, user_id: Uuid, vector: &[f32]) -> Result<()> {
        let body = json!({
            "points": [{
                "id": memory_id,
                "vector": vector,
                "payload": { "user_id": user_id }
            }]
        });

        let response = self
            .request(&self.points_url(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_error("vector upsert", self.config.timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!(
                "Vector store returned {status}: {body}"
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, vector, allow_ids), fields(subsystem = "search", component = "vector_index", op = "search", allow_count = allow_ids.len(), limit = limit))]
    async fn search(
        &self,
        vector: &[f32],
        allow_ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        if allow_ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "vector": vector,
            "limit": limit,
            "filter": { "must": [{ "has_id": allow_ids }] },
            "with_payload": false
        });

        let response = self
            .request(&self.points_url("/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_error("vector search", self.config.timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!(
                "Vector store returned {status}: {body}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse search response: {e}")))?;

        let hits: Vec<VectorHit> = parsed
            .result
            .into_iter()
            .map(|p| VectorHit {
                memory_id: p.id,
                score: p.score,
            })
            .collect();

        debug!(result_count = hits.len(), "Vector search complete");
        Ok(hits)
    }

    #[instrument(skip(self), fields(subsystem = "search", component = "vector_index", op = "remove", memory_id = %memory_id))]
    async fn remove(&self, memory_id: Uuid) -> Result<()> {
        let body = json!({ "points": [memory_id] });

        let response = self
            .request(&self.points_url("/delete"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_error("vector delete", self.config.timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Search(format!("Vector store returned {status}")));
        }
        Ok(())
    }
}

/// Second-pass narrowing for broad retrievals.
///
/// When a broad cast returns far more than needed and a subset clears
/// the quality bar, that subset replaces the full set — keeping recall
/// wide only when nothing good surfaced.
pub fn narrow_broad_results(hits: Vec<VectorHit>, max_results: usize) -> Vec<VectorHit> {
    if hits.len() <= max_results.saturating_mul(2) {
        return hits;
    }
    let good: Vec<VectorHit> = hits
        .iter()
        .filter(|h| h.score > defaults::BROAD_NARROWING_SCORE)
        .cloned()
        .collect();
    if good.is_empty() {
        hits
    } else {
        debug!(
            kept = good.len(),
            dropped = hits.len() - good.len(),
            "Broad retrieval narrowed to high-quality subset"
        );
        good
    }
}
