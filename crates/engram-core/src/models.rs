//! Core data models for engram.
//!
//! These types are shared across all engram crates and represent the
//! domain entities of the capture → memory → search pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// MEMORY TYPES
// =============================================================================

/// Structured signals extracted from captured content.
///
/// Explicit optional fields instead of a free-form JSON blob; anything a
/// future extractor emits that we don't model yet lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    /// How central this content is to the user's interests, [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
    /// How actionable/reusable the content is, [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usefulness: Option<f32>,
    /// Unmodeled extractor output, preserved for forward compatibility.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl ExtractedMetadata {
    /// True when no signal was extracted at all.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
            && self.categories.is_empty()
            && self.sentiment.is_none()
            && self.importance.is_none()
            && self.usefulness.is_none()
            && self.extra.is_empty()
    }
}

/// The durable unit of stored knowledge.
///
/// Created by the ingestion worker (new) or merged into (duplicate path);
/// never mutated by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub canonical_hash: String,
    pub url: Option<String>,
    pub title: Option<String>,
    /// One-line summary used for evidence lines and result snippets.
    pub summary: Option<String>,
    /// Origin category: "page", "note", "api", ...
    pub memory_type: String,
    /// Capture channel: "browser", "api", "import", ...
    pub source: String,
    pub metadata: ExtractedMetadata,
    pub importance_score: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a memory insert attempt.
///
/// A uniqueness violation on (user_id, canonical_hash) is resolved by
/// re-reading the conflicting row — the merge path, not an error path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryUpsert {
    /// A fresh memory was created.
    Created(Uuid),
    /// An existing memory with the same canonical hash absorbed the capture.
    Merged(Uuid),
}

impl MemoryUpsert {
    pub fn memory_id(&self) -> Uuid {
        match self {
            MemoryUpsert::Created(id) | MemoryUpsert::Merged(id) => *id,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, MemoryUpsert::Merged(_))
    }
}

// =============================================================================
// CAPTURE / INGESTION JOB TYPES
// =============================================================================

/// Caller-supplied metadata accompanying a capture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Explicit target for merge-on-recapture flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_memory_id: Option<Uuid>,
}

/// A capture submitted for ingestion.
#[derive(Debug, Clone)]
pub struct NewCapture {
    pub user_id: Uuid,
    pub raw_text: String,
    pub metadata: CaptureMetadata,
}

/// Ingestion job lifecycle state.
///
/// `Delayed` is the retry-backoff state: the job is queued but not
/// claimable until its `run_at` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Delayed,
    Completed,
    Failed,
    Cancelled,
}

/// A persisted ingestion job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,
    pub raw_text: String,
    pub canonical_hash: String,
    pub normalized_url: Option<String>,
    pub metadata: CaptureMetadata,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Cross-process cancellation flag, checked at defined checkpoints.
    pub cancel_requested: bool,
    /// Lease expiry; a Running job past this point is stalled.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Earliest claim time for Delayed jobs.
    pub run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of submitting a capture to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was queued.
    Queued(Uuid),
    /// An equivalent job is already pending; its id is returned.
    Duplicate(Uuid),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueOutcome::Queued(id) | EnqueueOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueOutcome::Duplicate(_))
    }
}

/// Queue counters for observability endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub delayed: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// A nearest-neighbor hit from the external vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub memory_id: Uuid,
    pub score: f32,
}

/// Transient per-query scoring record for one candidate.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub memory_id: Uuid,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub coverage_ratio: f32,
    pub final_score: f32,
    pub created_at: DateTime<Utc>,
    pub importance_score: f32,
}

/// One item of a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub memory_id: Uuid,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub related_memories: Vec<Uuid>,
    pub score: f32,
    pub memory_type: String,
    pub importance_score: f32,
    pub source: String,
}

/// An ordered citation resolved from the synthesized answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based evidence label as it appeared in the answer.
    pub label: usize,
    pub memory_id: Uuid,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// How wide to cast the retrieval net for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Narrow,
    Balanced,
    Broad,
}

/// Estimated age of the memories a query is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryAge {
    Recent,
    Medium,
    Old,
    Any,
}

// =============================================================================
// QUERY CLASSIFICATION
// =============================================================================

/// Intent class of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    /// "what did I read about X" — looking for stored memories.
    Recall,
    /// Generic lookup.
    Search,
    /// "help me plan / what should I do next".
    Plan,
    /// Questions about the user themself.
    Profile,
    /// Counting/aggregation questions.
    Metric,
}

impl QueryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryClass::Recall => "recall",
            QueryClass::Search => "search",
            QueryClass::Plan => "plan",
            QueryClass::Profile => "profile",
            QueryClass::Metric => "metric",
        }
    }
}

/// Classification result, cached by normalized-query hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryClassification {
    pub class: QueryClass,
    pub confidence: f32,
    /// Policy name the classifier recommends for this intent.
    pub suggested_policy: String,
}

// =============================================================================
// ASYNC SEARCH JOBS
// =============================================================================

/// Status of an asynchronously dispatched search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Poll-able record of an asynchronous search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub query: String,
    pub status: SearchJobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResultItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_metadata_is_empty() {
        assert!(ExtractedMetadata::default().is_empty());

        let meta = ExtractedMetadata {
            topics: vec!["rust".to_string()],
            ..Default::default()
        };
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_extracted_metadata_skips_empty_fields() {
        let json = serde_json::to_value(ExtractedMetadata::default()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.is_empty());
    }

    #[test]
    fn test_extracted_metadata_round_trip() {
        let meta = ExtractedMetadata {
            topics: vec!["rust".to_string(), "async".to_string()],
            categories: vec!["programming".to_string()],
            sentiment: Some("positive".to_string()),
            importance: Some(0.8),
            usefulness: Some(0.6),
            extra: serde_json::Map::new(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: ExtractedMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn test_memory_upsert_accessors() {
        let id = Uuid::new_v4();
        assert_eq!(MemoryUpsert::Created(id).memory_id(), id);
        assert_eq!(MemoryUpsert::Merged(id).memory_id(), id);
        assert!(MemoryUpsert::Merged(id).is_merged());
        assert!(!MemoryUpsert::Created(id).is_merged());
    }

    #[test]
    fn test_enqueue_outcome_accessors() {
        let id = Uuid::new_v4();
        assert_eq!(EnqueueOutcome::Queued(id).job_id(), id);
        assert!(EnqueueOutcome::Duplicate(id).is_duplicate());
        assert!(!EnqueueOutcome::Queued(id).is_duplicate());
    }

    #[test]
    fn test_job_status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"cancelled\"").unwrap(),
            JobStatus::Cancelled
        );
    }

    #[test]
    fn test_query_class_as_str() {
        assert_eq!(QueryClass::Recall.as_str(), "recall");
        assert_eq!(QueryClass::Metric.as_str(), "metric");
    }

    #[test]
    fn test_search_job_status_serde() {
        assert_eq!(
            serde_json::to_string(&SearchJobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }

    #[test]
    fn test_search_strategy_serde() {
        assert_eq!(
            serde_json::to_string(&SearchStrategy::Broad).unwrap(),
            "\"broad\""
        );
        assert_eq!(
            serde_json::from_str::<SearchStrategy>("\"narrow\"").unwrap(),
            SearchStrategy::Narrow
        );
    }
}
