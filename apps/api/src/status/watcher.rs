//! Status Watcher: reads a portfolio's lifecycle state and follows its changes.
//!
//! Display state machine (derived from the record status):
//!   PROCESSING → READY   on worker success
//!   PROCESSING → ERROR   on worker failure or when the record cannot be read
//! READY and ERROR are terminal.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::portfolio::{PortfolioData, PortfolioRecord, PortfolioStatus};
use crate::status::feed::{ChangeFeed, Subscription};
use crate::storage::PortfolioStore;

/// What a viewer is shown for a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioView {
    pub id: Uuid,
    pub status: PortfolioStatus,
    pub data: Option<PortfolioData>,
}

impl PortfolioView {
    /// Any fetch failure, including a missing record, displays as ERROR.
    pub fn from_fetch(id: Uuid, result: Result<PortfolioRecord, AppError>) -> Self {
        match result {
            Ok(record) => Self {
                id,
                status: record.status,
                data: record.data,
            },
            Err(e) => {
                debug!("Portfolio {id} displayed as ERROR: {e}");
                Self {
                    id,
                    status: PortfolioStatus::Error,
                    data: None,
                }
            }
        }
    }
}

pub struct StatusWatcher<'a> {
    store: &'a dyn PortfolioStore,
    feed: &'a ChangeFeed,
}

impl<'a> StatusWatcher<'a> {
    pub fn new(store: &'a dyn PortfolioStore, feed: &'a ChangeFeed) -> Self {
        Self { store, feed }
    }

    /// Single read of the record. Fails with `NotFound` when it does not exist.
    pub async fn fetch(&self, portfolio_id: Uuid) -> Result<PortfolioRecord, AppError> {
        self.store
            .fetch(portfolio_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Portfolio {portfolio_id} not found")))
    }

    pub async fn view(&self, portfolio_id: Uuid) -> PortfolioView {
        PortfolioView::from_fetch(portfolio_id, self.fetch(portfolio_id).await)
    }

    /// Subscribes to updates of `portfolio_id`. Dropping the subscription closes it.
    pub fn on_change(&self, portfolio_id: Uuid) -> Subscription {
        self.feed.subscribe(portfolio_id)
    }

    /// Waits until the portfolio displays a terminal status.
    ///
    /// Re-reads on every change signal and additionally every `poll_interval`,
    /// so a closed or silent feed still makes progress.
    pub async fn settle(&self, portfolio_id: Uuid, poll_interval: Duration) -> PortfolioView {
        // Subscribe before the first read so an update between the two is not lost.
        let mut subscription = self.on_change(portfolio_id);
        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut feed_open = true;

        loop {
            let view = self.view(portfolio_id).await;
            if view.status.is_terminal() {
                return view;
            }

            if feed_open {
                tokio::select! {
                    signal = subscription.next_reload() => {
                        feed_open = signal.is_some();
                    }
                    _ = ticker.tick() => {}
                }
            } else {
                ticker.tick().await;
            }
        }
    }
}
