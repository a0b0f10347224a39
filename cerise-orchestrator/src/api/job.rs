//! Job API Handlers
//!
//! HTTP endpoints for submitting and managing jobs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use cerise_core::dto::job::{CreateJob, JobView};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /jobs
/// Submit a new job
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    if req.workflow.trim().is_empty() {
        return Err(ApiError::BadRequest("workflow must be given".to_string()));
    }

    let input = if req.input.is_null() {
        "{}".to_string()
    } else if req.input.is_object() {
        req.input.to_string()
    } else {
        return Err(ApiError::BadRequest(
            "input must be a JSON object".to_string(),
        ));
    };

    let job = state
        .registry
        .create_job(&req.name, &req.workflow, &input)
        .await?;

    tracing::info!("Job created: {} ({})", job.id, job.name);

    Ok((
        StatusCode::CREATED,
        Json(JobView::from_job(&job, &state.config.base_url)),
    ))
}

/// GET /jobs
/// List all jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<JobView>>> {
    tracing::debug!("Listing all jobs");

    let jobs = state.registry.list_jobs().await?;
    let views = jobs
        .iter()
        .map(|job| JobView::from_job(job, &state.config.base_url))
        .collect();

    Ok(Json(views))
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    tracing::debug!("Getting job: {}", id);

    let job = state.registry.get_job(id).await?;
    Ok(Json(JobView::from_job(&job, &state.config.base_url)))
}

/// GET /jobs/{id}/log
/// Plain text log of the job
pub async fn get_job_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<String> {
    let job = state.registry.get_job(id).await?;
    Ok(job.log)
}

/// POST /jobs/{id}/cancel
/// Request cancellation; the back end stops the job on its next visit
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    let mut lease = state.registry.acquire(id).await?;
    if lease.request_cancel() {
        tracing::info!("Cancellation requested for job {}", id);
        lease.info("Cancellation requested");
        state.registry.commit(&lease).await?;
    }

    Ok(Json(JobView::from_job(&lease, &state.config.base_url)))
}

/// DELETE /jobs/{id}
/// Cancel the job if needed and mark it for removal
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut lease = state.registry.acquire(id).await?;
    lease.request_cancel();
    lease.please_delete = true;
    state.registry.commit(&lease).await?;

    tracing::info!("Job {} marked for deletion", id);
    Ok(StatusCode::NO_CONTENT)
}
