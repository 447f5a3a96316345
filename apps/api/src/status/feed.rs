//! Change feed: in-process publish/subscribe of portfolio row mutations.
//!
//! Production events come from Postgres (`pg_notify` trigger on `portfolios`)
//! via [`spawn_pg_listener`]. Subscribers filter by portfolio id.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::portfolio::PortfolioStatus;

/// Postgres notification channel written by the `portfolios_notify` trigger.
pub const NOTIFY_CHANNEL: &str = "portfolio_changes";
const FEED_CAPACITY: usize = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level mutation of the portfolio table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub event: ChangeKind,
    pub id: Uuid,
    #[serde(default)]
    pub status: Option<PortfolioStatus>,
}

/// Signal that a watched portfolio changed and should be re-fetched in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reload {
    pub portfolio_id: Uuid,
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<RecordChange>,
    open: Arc<AtomicUsize>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publishes a change to every open subscription. Dropped if nobody listens.
    pub fn publish(&self, change: RecordChange) {
        let _ = self.sender.send(change);
    }

    /// Opens a subscription filtered to `portfolio_id`. Closed when dropped.
    pub fn subscribe(&self, portfolio_id: Uuid) -> Subscription {
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Opened change subscription for {portfolio_id} ({open} open)");
        Subscription {
            portfolio_id,
            receiver: self.sender.subscribe(),
            open: Arc::clone(&self.open),
        }
    }

    /// Number of subscriptions currently open.
    pub fn open_subscriptions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

pub struct Subscription {
    portfolio_id: Uuid,
    receiver: broadcast::Receiver<RecordChange>,
    open: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn portfolio_id(&self) -> Uuid {
        self.portfolio_id
    }

    /// Waits for the next update of the watched portfolio.
    ///
    /// A lagged receiver yields a reload as well, since a missed event may
    /// have been ours. Returns `None` once the feed is closed.
    pub async fn next_reload(&mut self) -> Option<Reload> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.event == ChangeKind::Update && change.id == self.portfolio_id => {
                    return Some(Reload {
                        portfolio_id: self.portfolio_id,
                    });
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Change subscription for {} lagged by {skipped} events",
                        self.portfolio_id
                    );
                    return Some(Reload {
                        portfolio_id: self.portfolio_id,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let remaining = self.open.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(
            "Closed change subscription for {} ({remaining} open)",
            self.portfolio_id
        );
    }
}

/// Parses a `portfolio_changes` notification payload.
pub fn parse_notification(payload: &str) -> Result<RecordChange, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Forwards Postgres notifications into the feed until the task is aborted.
/// Reconnects after listener errors.
pub fn spawn_pg_listener(pool: PgPool, feed: ChangeFeed) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut listener = match PgListener::connect_with(&pool).await {
                Ok(listener) => listener,
                Err(e) => {
                    warn!("Change feed connect failed: {e}; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            if let Err(e) = listener.listen(NOTIFY_CHANNEL).await {
                warn!("LISTEN {NOTIFY_CHANNEL} failed: {e}; retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
            info!("Listening for portfolio changes on '{NOTIFY_CHANNEL}'");

            loop {
                match listener.recv().await {
                    Ok(notification) => match parse_notification(notification.payload()) {
                        Ok(change) => feed.publish(change),
                        Err(e) => warn!("Ignoring malformed change notification: {e}"),
                    },
                    Err(e) => {
                        warn!("Change feed connection lost: {e}; reconnecting");
                        break;
                    }
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}
