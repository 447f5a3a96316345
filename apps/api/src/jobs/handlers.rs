//! Axum route handlers for job submission and the worker protocol.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::AppError;
use crate::generation::coordinator::{enqueue_job, JobRequest};
use crate::jobs::queue::{EnqueueOutcome, Job};
use crate::jobs::worker::{complete_job, fail_job, JobCompletion, JobFailure};
use crate::models::portfolio::PortfolioData;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct JobSubmitResponse {
    pub status: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteJobRequest {
    pub data: PortfolioData,
}

#[derive(Debug, Deserialize)]
pub struct FailJobRequest {
    pub reason: String,
}

/// POST /api/v1/jobs
///
/// Body `{portfolioId, resumeUrl}`. Success-shaped whether or not a job was
/// actually added; only unexpected failures answer `status: false`.
pub async fn handle_add_job(
    State(state): State<AppState>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> (StatusCode, Json<JobSubmitResponse>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            error!("Rejected job submission: {rejection}");
            return failure(StatusCode::BAD_REQUEST);
        }
    };

    match enqueue_job(state.queue.as_ref(), request).await {
        Ok(EnqueueOutcome::Enqueued) => success("Job added successfully!"),
        Ok(EnqueueOutcome::Duplicate) => success("Job already exists!"),
        Err(e) => {
            error!("Failed to add job: {e}");
            failure(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn success(message: &str) -> (StatusCode, Json<JobSubmitResponse>) {
    (
        StatusCode::OK,
        Json(JobSubmitResponse {
            status: true,
            message: message.to_string(),
        }),
    )
}

fn failure(status: StatusCode) -> (StatusCode, Json<JobSubmitResponse>) {
    (
        status,
        Json(JobSubmitResponse {
            status: false,
            message: "Failed to add job!".to_string(),
        }),
    )
}

/// POST /internal/v1/jobs/reserve
///
/// Claims the next ready job, or `null` when the queue is idle.
pub async fn handle_reserve(State(state): State<AppState>) -> Result<Json<Option<Job>>, AppError> {
    Ok(Json(state.queue.reserve().await?))
}

/// POST /internal/v1/jobs/:key/complete
pub async fn handle_complete(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<CompleteJobRequest>,
) -> Result<Json<JobCompletion>, AppError> {
    let completion = complete_job(
        state.store.as_ref(),
        state.queue.as_ref(),
        &key,
        request.data,
    )
    .await?;
    Ok(Json(completion))
}

/// POST /internal/v1/jobs/:key/fail
pub async fn handle_fail(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<FailJobRequest>,
) -> Result<Json<JobFailure>, AppError> {
    let failure = fail_job(
        state.store.as_ref(),
        state.queue.as_ref(),
        &key,
        &request.reason,
    )
    .await?;
    Ok(Json(failure))
}
