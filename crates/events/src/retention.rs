//! Periodic purge of old notifications.
//!
//! Deletes notifications older than the retention period whose delivery
//! attempts have all settled (delivered or failed terminally). Attempts
//! still pending or retrying keep their notification alive.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::store::NotificationStore;

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// How often the cleanup job runs.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run one purge pass. Returns the number of notifications removed.
pub async fn purge_once(store: &dyn NotificationStore, retention_days: i64) -> u64 {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    match store.purge_notifications(cutoff).await {
        Ok(deleted) => {
            if deleted > 0 {
                tracing::info!(deleted, "Notification retention: purged old notifications");
            } else {
                tracing::debug!("Notification retention: nothing to purge");
            }
            deleted
        }
        Err(e) => {
            tracing::error!(error = %e, "Notification retention: cleanup failed");
            0
        }
    }
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn NotificationStore>, retention_days: i64, cancel: CancellationToken) {
    tracing::info!(
        retention_days,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Notification retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Notification retention job stopping");
                break;
            }
            _ = interval.tick() => {
                purge_once(store.as_ref(), retention_days).await;
            }
        }
    }
}
