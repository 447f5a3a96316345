pub mod health;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::generation::handlers as generation;
use crate::jobs::handlers as jobs;
use crate::portfolio::handlers as portfolio;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Portfolio API
        .route(
            "/api/v1/portfolios",
            post(generation::handle_submit).layer(upload_limit),
        )
        .route("/api/v1/portfolios/:id", get(portfolio::handle_get_portfolio))
        .route("/api/v1/portfolios/:id/view", get(portfolio::handle_view))
        .route("/api/v1/portfolios/:id/events", get(portfolio::handle_events))
        .route(
            "/api/v1/portfolios/:id/photo",
            put(portfolio::handle_update_photo).layer(upload_limit),
        )
        .route("/api/v1/templates", get(portfolio::handle_list_templates))
        // Job submission
        .route("/api/v1/jobs", post(jobs::handle_add_job))
        // Worker protocol
        .route("/internal/v1/jobs/reserve", post(jobs::handle_reserve))
        .route("/internal/v1/jobs/:key/complete", post(jobs::handle_complete))
        .route("/internal/v1/jobs/:key/fail", post(jobs::handle_fail))
        .with_state(state)
}
