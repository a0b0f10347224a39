//! API Module
//!
//! REST front end: job submission, inspection, cancellation and deletion.
//! Handlers only touch the job registry; all remote work is left to the
//! back end.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::repository::JobRegistry;

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn JobRegistry>,
    pub config: Arc<Config>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", post(job::create_job).get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job).delete(job::delete_job))
        .route("/jobs/{id}/log", get(job::get_job_log))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
