//! Queue observability endpoints.

use axum::extract::State;
use axum::Json;

use engram_core::{JobRepository, QueueStats};

use crate::handlers::ApiError;
use crate::query_types::CleanupResponse;
use crate::AppState;

/// `GET /api/jobs/stats` — queue counters.
pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.jobs.queue_stats().await?))
}

/// `POST /api/jobs/cleanup` — remove completed jobs.
///
/// Running, pending, delayed, and failed jobs are preserved for
/// observability and retry.
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>, ApiError> {
    let removed = state.jobs.cleanup().await?;
    Ok(Json(CleanupResponse { removed }))
}
