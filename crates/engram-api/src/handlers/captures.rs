//! Capture ingestion endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use engram_core::{Error, JobRepository, NewCapture};

use crate::handlers::ApiError;
use crate::query_types::{
    CancelCaptureResponse, CaptureStatusResponse, EnqueueCaptureRequest, EnqueueCaptureResponse,
};
use crate::AppState;

/// `POST /api/captures` — submit raw captured text for ingestion.
///
/// Near-identical in-flight captures for the same user are suppressed;
/// the existing job id comes back flagged as a duplicate.
pub async fn enqueue_capture(
    State(state): State<AppState>,
    Json(request): Json<EnqueueCaptureRequest>,
) -> Result<(StatusCode, Json<EnqueueCaptureResponse>), ApiError> {
    let outcome = state
        .jobs
        .enqueue(NewCapture {
            user_id: request.user_id,
            raw_text: request.raw_text,
            metadata: request.metadata.unwrap_or_default(),
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueCaptureResponse {
            id: outcome.job_id(),
            is_duplicate: outcome.is_duplicate(),
        }),
    ))
}

/// `GET /api/captures/:id` — inspect one ingestion job.
pub async fn capture_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CaptureStatusResponse>, ApiError> {
    let job = state
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("ingestion job {id}")))?;

    Ok(Json(CaptureStatusResponse {
        id: job.id,
        status: job.status,
        error_message: job.error_message,
        retry_count: job.retry_count,
    }))
}

/// `POST /api/captures/:id/cancel` — flag a job's cancellation token.
///
/// The flag is visible cross-process; the worker checks it at its
/// checkpoints and discards the job without retry.
pub async fn cancel_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelCaptureResponse>, ApiError> {
    let cancelled = state.jobs.request_cancel(id).await?;
    Ok(Json(CancelCaptureResponse { id, cancelled }))
}
