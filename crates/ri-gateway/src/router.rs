use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::webhook;

/// Assemble the full Agent + webhook + ops route table.
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/ri/register", post(handlers::register))
        .route("/ri/heartbeat", post(handlers::heartbeat))
        .route("/ri/poll", get(handlers::poll))
        .route("/ri/response", post(handlers::response))
        .route("/ri/list", get(handlers::list))
        .route("/webhook/:platform", post(webhook::webhook_async))
        .route("/webhook/:platform/sync", post(webhook::webhook_sync))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
