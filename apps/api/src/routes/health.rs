use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// `accepting` while intake is open, `503 draining` once shutdown has begun.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let draining = state.orchestrator.is_draining();
    let status = if draining {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({
            "status": if draining { "draining" } else { "accepting" },
            "in_flight": state.orchestrator.in_flight(),
            "version": env!("CARGO_PKG_VERSION"),
            "service": "cv-ingest"
        })),
    )
}
