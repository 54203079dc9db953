//! Route configuration and setup

use axum::{http::StatusCode, middleware, response::IntoResponse, Router};
use readiness_infra::{readiness_middleware, ReadinessState};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the router. Only the ready path is answered, by the middleware;
/// everything else falls through to 404.
pub fn setup_routes(readiness: ReadinessState) -> Router {
    Router::new()
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::new(readiness),
            readiness_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found\n")
}
