//! Route Configuration
//!
//! Configures all HTTP routes for the gateway.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::auth_middleware;
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // WebSocket endpoint; auth runs on the upgrade request so the socket
    // is bound to a user before it opens.
    let ws_routes = Router::new()
        .route("/ws/chat.io", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        .merge(ws_routes)
        // Connection diagnostics
        .route("/ws/connect/detail", get(handlers::connect::connect_detail))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes (protected)
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/talk/session/list", get(handlers::session::list_sessions))
        .route(
            "/talk/session/clear-unread",
            post(handlers::session::clear_unread),
        )
        .route("/talk/records", get(handlers::talk::get_records))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
