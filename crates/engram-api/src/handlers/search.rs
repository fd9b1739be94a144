//! Search endpoints: synchronous, asynchronous dispatch, and job
//! polling.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};
use uuid::Uuid;

use engram_core::{Error, SearchJobStatus, SearchJobStore};
use engram_search::{SearchRequest, SearchResponse};

use crate::handlers::ApiError;
use crate::query_types::{
    SearchApiRequest, SearchApiResponse, SearchJobCreatedResponse, SearchJobResponse,
};
use crate::AppState;

fn to_pipeline_request(request: &SearchApiRequest) -> SearchRequest {
    SearchRequest {
        user_id: request.user_id,
        query: request.query.clone(),
        limit: request.limit,
        policy: request.policy.clone(),
        context_only: request.context_only,
    }
}

fn to_api_response(response: SearchResponse) -> SearchApiResponse {
    SearchApiResponse {
        query: response.query,
        results: response.results,
        answer: response.answer,
        citations: response.citations,
        policy: response.policy,
        strategy: response.strategy,
    }
}

/// `POST /api/search` — run a search, synchronously or as a pollable
/// job.
///
/// With `async_job: true` the job record is created first and the
/// pipeline runs in a spawned task; clients poll, there is no push
/// notification.
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchApiRequest>,
) -> Result<Response, ApiError> {
    if request.query.trim().is_empty() {
        return Err(Error::InvalidInput("query is empty".to_string()).into());
    }

    if request.async_job {
        let job_id = state
            .search_jobs
            .create(request.user_id, &request.query)
            .await?;

        let task_state = state.clone();
        let pipeline_request = to_pipeline_request(&request);
        tokio::spawn(async move {
            run_async_search(task_state, job_id, pipeline_request).await;
        });

        return Ok((
            StatusCode::ACCEPTED,
            Json(SearchJobCreatedResponse {
                job_id,
                status: SearchJobStatus::Pending,
            }),
        )
            .into_response());
    }

    let response = state.pipeline.search(&to_pipeline_request(&request)).await?;
    Ok(Json(to_api_response(response)).into_response())
}

/// Drive an asynchronously dispatched search to its terminal job state.
async fn run_async_search(state: AppState, job_id: Uuid, request: SearchRequest) {
    if let Err(e) = state.search_jobs.mark_processing(job_id).await {
        warn!(job_id = %job_id, error = %e, "Failed to mark search job processing");
    }

    match state.pipeline.search(&request).await {
        Ok(response) => {
            if let Err(e) = state
                .search_jobs
                .complete(
                    job_id,
                    &response.results,
                    response.answer.as_deref(),
                    &response.citations,
                )
                .await
            {
                error!(job_id = %job_id, error = %e, "Failed to store search job result");
            }
        }
        Err(e) => {
            if let Err(store_err) = state.search_jobs.fail(job_id, &e.to_string()).await {
                error!(job_id = %job_id, error = %store_err, "Failed to store search job failure");
            }
        }
    }
}

/// `GET /api/search/jobs/:id` — poll an asynchronous search job.
/// Expired records read as absent.
pub async fn get_search_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SearchJobResponse>, ApiError> {
    let job = state
        .search_jobs
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("search job {id}")))?;

    Ok(Json(SearchJobResponse {
        id: job.id,
        status: job.status,
        results: job.results,
        answer: job.answer,
        citations: job.citations,
        error: job.error_message,
    }))
}
