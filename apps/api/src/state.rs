use std::sync::Arc;

use crate::config::Config;
use crate::jobs::JobQueue;
use crate::status::ChangeFeed;
use crate::storage::{BlobStore, PortfolioStore};

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Collaborators are built once at startup and held behind traits so tests
/// can swap in in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PortfolioStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn JobQueue>,
    /// Portfolio change events, fed by the Postgres listener.
    pub feed: ChangeFeed,
    pub config: Config,
}
