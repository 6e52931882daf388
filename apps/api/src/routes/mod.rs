pub mod health;
pub mod intake;
pub mod progress;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Room for the text fields that travel alongside the file.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.orchestrator.max_upload_bytes() + FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health::health_handler))
        // Intake
        .route(
            "/api/v1/cv/upload",
            post(intake::handle_upload).layer(body_limit.clone()),
        )
        .route(
            "/api/v1/postings/:posting_id/applications",
            post(intake::handle_application).layer(body_limit),
        )
        // Progress & cancellation
        .route(
            "/api/v1/ingestion/:job_id",
            get(progress::handle_get_progress).delete(progress::handle_cancel),
        )
        .with_state(state)
}
