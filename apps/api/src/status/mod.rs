// Status propagation: the record change feed and the watcher that turns it
// into display state and reload signals.

pub mod feed;
pub mod watcher;

pub use feed::{spawn_pg_listener, ChangeFeed, ChangeKind, RecordChange, Subscription};
pub use watcher::{PortfolioView, StatusWatcher};
