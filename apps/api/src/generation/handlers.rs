//! Axum route handlers for portfolio generation.

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::capability::CapabilityStore;
use crate::errors::AppError;
use crate::generation::coordinator::submit_resume;
use crate::models::portfolio::PortfolioStatus;
use crate::routes::upload::read_upload;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub portfolio_id: Uuid,
    pub status: PortfolioStatus,
}

/// POST /api/v1/portfolios
///
/// Accepts a multipart `resume` field (PDF). Returns the new portfolio id and
/// persists the caller's grant for it in the access cookie.
pub async fn handle_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let resume = read_upload(&mut multipart, "resume").await?;
    let mut capabilities =
        CapabilityStore::from_headers(state.config.demo_portfolio_id.as_deref(), &headers);

    let portfolio_id = submit_resume(
        state.store.as_ref(),
        state.blobs.as_ref(),
        state.queue.as_ref(),
        &mut capabilities,
        resume,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, capabilities.to_set_cookie())],
        Json(SubmitResponse {
            portfolio_id,
            status: PortfolioStatus::Processing,
        }),
    ))
}
