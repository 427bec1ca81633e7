use std::time::Duration;

use axum::{extract::DefaultBodyLimit, http::StatusCode, routing::get, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::cors::build_cors_layer;
use crate::middleware::request_id::inject_request_id;
use crate::state::AppState;

pub mod activities;
pub mod dashboard;
pub mod health;
pub mod jobs;
pub mod pivots;
pub mod reservations;
pub mod schedules;
pub mod slots;
pub mod tariffs;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(activities::router())
        .merge(schedules::router())
        .merge(tariffs::router())
        .merge(pivots::router())
        .merge(slots::router())
        .merge(reservations::router())
        .merge(dashboard::router())
        .merge(jobs::router())
}

/// Full application without rate limiting, which needs the peer address and
/// is added by `main`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(&state.config.api_prefix, api_router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)) // 2 MB
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(axum::middleware::from_fn(inject_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&state.config))
        .with_state(state)
}
