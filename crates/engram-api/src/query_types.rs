//! Request/response DTOs for the HTTP API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engram_core::{CaptureMetadata, Citation, SearchJobStatus, SearchResultItem, SearchStrategy};

/// Body of `POST /api/captures`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueCaptureRequest {
    pub user_id: Uuid,
    pub raw_text: String,
    #[serde(default)]
    pub metadata: Option<CaptureMetadata>,
}

/// Response of `POST /api/captures`.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueCaptureResponse {
    pub id: Uuid,
    pub is_duplicate: bool,
}

/// Body of `POST /api/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchApiRequest {
    pub user_id: Uuid,
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub policy: Option<String>,
    /// Return ranked results only, skipping answer synthesis.
    #[serde(default)]
    pub context_only: bool,
    /// Dispatch asynchronously and return a pollable job id.
    #[serde(default)]
    pub async_job: bool,
}

/// Synchronous search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchApiResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub policy: String,
    pub strategy: SearchStrategy,
}

/// Response when a search was dispatched asynchronously.
#[derive(Debug, Clone, Serialize)]
pub struct SearchJobCreatedResponse {
    pub job_id: Uuid,
    pub status: SearchJobStatus,
}

/// Response of `GET /api/search/jobs/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchJobResponse {
    pub id: Uuid,
    pub status: SearchJobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResultItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `POST /api/captures/:id/cancel`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelCaptureResponse {
    pub id: Uuid,
    pub cancelled: bool,
}

/// Response of `GET /api/captures/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatusResponse {
    pub id: Uuid,
    pub status: engram_core::JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: i32,
}

/// Response of `POST /api/jobs/cleanup`.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub removed: i64,
}
