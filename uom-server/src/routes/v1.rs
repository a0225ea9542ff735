use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs::{get_job, orchestrator_stats, stream_job, submit_sandbox_first};
use crate::infra::app_state::AppState;

/// Versioned v1 API surface.
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/process/sandbox-first", post(submit_sandbox_first))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/stream", get(stream_job))
        .route("/orchestrator/stats", get(orchestrator_stats))
}
