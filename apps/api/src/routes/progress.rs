use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::orchestrator::CancelOutcome;
use crate::pipeline::progress::ProgressSnapshot;
use crate::state::AppState;

/// GET /api/v1/ingestion/:job_id
pub async fn handle_get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ProgressSnapshot>, AppError> {
    state
        .orchestrator
        .tracker()
        .get(job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("ingestion job {job_id}")))
}

/// DELETE /api/v1/ingestion/:job_id
pub async fn handle_cancel(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    match state.orchestrator.cancel(job_id) {
        CancelOutcome::Signalled => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "job_id": job_id, "status": "cancelling" })),
        )),
        CancelOutcome::AlreadyTerminal => Err(AppError::Conflict(format!(
            "ingestion job {job_id} has already finished"
        ))),
        CancelOutcome::NotFound => Err(AppError::NotFound(format!("ingestion job {job_id}"))),
    }
}
