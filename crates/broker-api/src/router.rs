use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Assemble the HTTP surface described in the process configuration: upload,
/// result lookup, notification registration, per-job progress, and a bare
/// liveness probe.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/upload", post(handlers::upload))
        .route("/api/result", get(handlers::result))
        .route("/api/notify", post(handlers::notify))
        .route("/api/jobs/:id/progress", get(handlers::progress))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
