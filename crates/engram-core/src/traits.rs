//! Core traits for engram abstractions.
//!
//! These traits define the seams between pipeline components: storage
//! repositories, inference backends, the external vector index, and the
//! key-value cache. Everything is injected explicitly — constructed once
//! at process start and passed into the components that need it — so
//! tests can substitute fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

/// Embedding vector as produced by an [`Embedder`] and consumed by a
/// [`VectorIndex`].
pub type Vector = Vec<f32>;

// =============================================================================
// MEMORY REPOSITORY
// =============================================================================

/// Request for creating a new memory.
#[derive(Debug, Clone)]
pub struct CreateMemoryRequest {
    pub user_id: Uuid,
    pub content: String,
    pub canonical_hash: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub memory_type: String,
    pub source: String,
}

/// Repository for the durable memory corpus.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Insert a new memory.
    ///
    /// A uniqueness violation on (user_id, canonical_hash) — a concurrent
    /// worker racing the same content — is resolved by re-reading the
    /// conflicting row and returning [`MemoryUpsert::Merged`].
    async fn insert(&self, req: CreateMemoryRequest) -> Result<MemoryUpsert>;

    /// Fetch a memory by id.
    async fn fetch(&self, id: Uuid) -> Result<Memory>;

    /// Fetch several memories, preserving input order where found.
    async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Memory>>;

    /// Look up a memory by its canonical hash within one user's corpus.
    async fn find_by_hash(&self, user_id: Uuid, canonical_hash: &str) -> Result<Option<Memory>>;

    /// Absorb a recaptured duplicate into an existing memory (bumps
    /// updated_at, fills missing url/title).
    async fn merge_capture(&self, memory_id: Uuid, capture: &NewCapture) -> Result<()>;

    /// Store extraction output on a memory.
    async fn update_metadata(
        &self,
        id: Uuid,
        metadata: &ExtractedMetadata,
        summary: Option<&str>,
    ) -> Result<()>;

    /// All memory ids in a user's corpus (the vector-search allow-list).
    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Corpus size for a user.
    async fn corpus_size(&self, user_id: Uuid) -> Result<i64>;

    /// Related memory ids (set by the relation-building pass).
    async fn related_ids(&self, memory_id: Uuid) -> Result<Vec<Uuid>>;

    /// Replace the related set for a memory.
    async fn set_related(&self, memory_id: Uuid, related: &[Uuid]) -> Result<()>;

    /// Fetch the user's profile summary, if one has been built.
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<String>>;

    /// Store (upsert) the user's profile summary.
    async fn store_profile(&self, user_id: Uuid, summary: &str) -> Result<()>;
}

// =============================================================================
// INGESTION JOB REPOSITORY
// =============================================================================

/// Repository for the persisted ingestion queue.
///
/// Queue state is the single source of truth and is safe for multiple
/// worker processes to share: claims take a lease, leases are renewed
/// while processing, and expired leases make a job stalled.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Submit a capture, suppressing duplicates already in flight for
    /// the same user (equal hash, or same URL with near-identical text).
    async fn enqueue(&self, capture: NewCapture) -> Result<EnqueueOutcome>;

    /// Claim the next runnable job, taking a lease on it.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Extend the lease of a running job.
    async fn renew_lease(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Record a failure: first failure delays a retry, the second is
    /// terminal.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Request cancellation (side-channel flag, visible cross-process).
    /// Returns false if the job is already terminal.
    async fn request_cancel(&self, job_id: Uuid) -> Result<bool>;

    /// Read the cancellation flag.
    async fn is_cancel_requested(&self, job_id: Uuid) -> Result<bool>;

    /// Mark a job cancelled (terminal, not a failure).
    async fn mark_cancelled(&self, job_id: Uuid) -> Result<()>;

    /// Recover stalled jobs: re-pend those whose lease expired, discard
    /// the ones whose cancellation flag is set. Returns recovered count.
    async fn recover_stalled(&self) -> Result<i64>;

    /// Delete completed jobs only; running/pending/delayed/failed rows
    /// are preserved for observability and retry.
    async fn cleanup(&self) -> Result<i64>;

    /// Fetch a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Queue counters.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Number of claimable jobs.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// SEARCH JOB STORE
// =============================================================================

/// Store for asynchronous search job records (short TTL, polled).
#[async_trait]
pub trait SearchJobStore: Send + Sync {
    /// Create a pending job record; returns its id.
    async fn create(&self, user_id: Uuid, query: &str) -> Result<Uuid>;

    /// Transition pending → processing.
    async fn mark_processing(&self, id: Uuid) -> Result<()>;

    /// Store the finished response on the record.
    async fn complete(
        &self,
        id: Uuid,
        results: &[SearchResultItem],
        answer: Option<&str>,
        citations: &[Citation],
    ) -> Result<()>;

    /// Mark the job failed with an operator-visible message.
    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    /// Fetch a job; expired records read as absent.
    async fn get(&self, id: Uuid) -> Result<Option<SearchJob>>;

    /// Remove expired records. Returns removed count.
    async fn purge_expired(&self) -> Result<i64>;
}

// =============================================================================
// QUERY EVENT STORE
// =============================================================================

/// Persisted record of which memories a query returned, kept for
/// relevance feedback. Recorded even for empty result sets.
#[async_trait]
pub trait QueryEventStore: Send + Sync {
    async fn record(&self, user_id: Uuid, query: &str, returned: &[Uuid]) -> Result<()>;
}

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Black-box embedding function: `embed(text) -> vector`.
///
/// Implementations enforce a per-call timeout and surface it as
/// [`crate::Error::Timeout`] rather than hanging the caller.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vector>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Black-box generation function: `generate(prompt) -> text`.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with JSON output enforcement where the backend supports it.
    async fn generate_json(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// Thin client of the external vector-similarity store.
///
/// Searches are always scoped by an explicit allow-list of the user's
/// memory ids; the store itself is multi-tenant.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, memory_id: Uuid, user_id: Uuid, vector: &[f32]) -> Result<()>;

    async fn search(&self, vector: &[f32], allow_ids: &[Uuid], limit: usize)
        -> Result<Vec<VectorHit>>;

    async fn remove(&self, memory_id: Uuid) -> Result<()>;
}

// =============================================================================
// KEY-VALUE CACHE
// =============================================================================

/// Best-effort key-value cache.
///
/// Implementations never propagate infrastructure failures: a failed get
/// is a miss, a failed set returns false, both are logged by the
/// implementation.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Option<String>;

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> bool;

    async fn delete(&self, key: &str) -> bool;
}

/// Typed get on any [`KeyValueCache`].
pub async fn cache_get_json<T: DeserializeOwned>(
    cache: &dyn KeyValueCache,
    key: &str,
) -> Option<T> {
    let raw = cache.get_raw(key).await?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache deserialization error, treating as miss");
            None
        }
    }
}

/// Typed set on any [`KeyValueCache`].
pub async fn cache_set_json<T: Serialize>(
    cache: &dyn KeyValueCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> bool {
    match serde_json::to_string(value) {
        Ok(raw) => cache.set_raw(key, &raw, ttl).await,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache serialization error, skipping set");
            false
        }
    }
}
