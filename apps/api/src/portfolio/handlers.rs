//! Axum route handlers for reading, watching and editing portfolios.

use std::convert::Infallible;

use axum::{
    extract::{rejection::QueryRejection, Multipart, Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use uuid::Uuid;

use crate::capability::CapabilityStore;
use crate::errors::AppError;
use crate::models::portfolio::{PortfolioData, PortfolioRecord, PortfolioStatus};
use crate::portfolio::photo::update_photo;
use crate::routes::upload::read_upload;
use crate::state::AppState;
use crate::status::{PortfolioView, StatusWatcher};
use crate::templates::{self, Template, TEMPLATES};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub id: String,
    pub status: PortfolioStatus,
    pub data: Option<PortfolioData>,
    pub template: &'static Template,
    /// Whether the photo and template controls should be offered.
    pub can_edit: bool,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub photo: String,
}

/// GET /api/v1/portfolios/:id
pub async fn handle_get_portfolio(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PortfolioRecord>, AppError> {
    let watcher = StatusWatcher::new(state.store.as_ref(), &state.feed);
    Ok(Json(watcher.fetch(id).await?))
}

/// GET /api/v1/portfolios/:id/view?template=N
///
/// Display state for a viewer. Never fails: unknown or malformed ids display
/// as ERROR, and a bad, repeated or unparsable query falls back to the
/// default template.
pub async fn handle_view(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
    headers: HeaderMap,
) -> Json<ViewResponse> {
    let capabilities =
        CapabilityStore::from_headers(state.config.demo_portfolio_id.as_deref(), &headers);
    let pairs = query.map(|Query(pairs)| pairs).unwrap_or_default();
    let template = templates::resolve_param(template_param(&pairs));

    let (status, data, can_edit) = match Uuid::parse_str(&raw_id) {
        Ok(id) => {
            let watcher = StatusWatcher::new(state.store.as_ref(), &state.feed);
            let PortfolioView { status, data, .. } = watcher.view(id).await;
            // Grants are stored in the canonical lowercase form.
            let can_edit = capabilities.has(&id.to_string()) || capabilities.has(&raw_id);
            (status, data, can_edit)
        }
        Err(_) => (PortfolioStatus::Error, None, capabilities.has(&raw_id)),
    };

    Json(ViewResponse {
        id: raw_id,
        status,
        data,
        template,
        can_edit,
    })
}

/// First `template` value in the query string.
fn template_param(pairs: &[(String, String)]) -> Option<&str> {
    pairs
        .iter()
        .find(|(name, _)| name == "template")
        .map(|(_, value)| value.as_str())
}

/// GET /api/v1/portfolios/:id/events
///
/// Server-sent `reload` events whenever the portfolio record is updated.
/// The subscription is released when the client disconnects.
pub async fn handle_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let watcher = StatusWatcher::new(state.store.as_ref(), &state.feed);
    let subscription = watcher.on_change(id);

    let events = stream::unfold(subscription, |mut subscription| async move {
        let reload = subscription.next_reload().await?;
        let event = Event::default()
            .event("reload")
            .data(reload.portfolio_id.to_string());
        Some((Ok(event), subscription))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// PUT /api/v1/portfolios/:id/photo
///
/// Multipart `image` field. Requires a capability grant for the portfolio.
pub async fn handle_update_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<PhotoResponse>, AppError> {
    let capabilities =
        CapabilityStore::from_headers(state.config.demo_portfolio_id.as_deref(), &headers);
    if !capabilities.has(&id.to_string()) {
        return Err(AppError::Forbidden);
    }

    let image = read_upload(&mut multipart, "image").await?;
    let photo = update_photo(state.store.as_ref(), state.blobs.as_ref(), id, image).await?;
    Ok(Json(PhotoResponse { photo }))
}

/// GET /api/v1/templates
pub async fn handle_list_templates() -> Json<&'static [Template]> {
    Json(&TEMPLATES)
}
