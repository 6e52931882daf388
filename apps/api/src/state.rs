use crate::pipeline::orchestrator::Orchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Single entry point for both intake channels, progress and cancellation.
    pub orchestrator: Orchestrator,
}
