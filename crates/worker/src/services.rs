//! Lifecycle of the background delivery tasks.

use std::sync::Arc;
use std::time::Duration;

use nrc_events::{
    retention, Broker, DeliveryAlerts, DeliveryDispatcher, EventBus, NotificationStore,
    SubscriptionIndex,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Dispatcher, alerts and retention running on a shared cancellation token.
pub struct BackgroundServices {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl BackgroundServices {
    /// Spawn all background tasks. Fails only if the outbound HTTP client
    /// cannot be built.
    pub fn start(
        store: Arc<dyn NotificationStore>,
        index: Arc<SubscriptionIndex>,
        broker: Arc<dyn Broker>,
        events: Arc<EventBus>,
        config: &WorkerConfig,
    ) -> Result<Self, reqwest::Error> {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let dispatcher = DeliveryDispatcher::new(
            Arc::clone(&store),
            index,
            broker,
            Arc::clone(&events),
            config.dispatch.clone(),
        )?;
        tasks.spawn(dispatcher.run(cancel.clone()));

        // Alerts stop on cancel or when every bus handle is dropped.
        let alerts = DeliveryAlerts::new(config.alert_threshold);
        let receiver = events.subscribe();
        let alerts_cancel = cancel.clone();
        tasks.spawn(async move {
            tokio::select! {
                () = alerts.run(receiver) => {}
                () = alerts_cancel.cancelled() => {}
            }
        });

        tasks.spawn(retention::run(store, config.retention_days, cancel.clone()));

        tracing::info!("Background services started (dispatcher, alerts, retention)");
        Ok(Self { cancel, tasks })
    }

    /// Signal every task to stop and wait up to `timeout` for in-flight
    /// deliveries to finish. Tasks still running after that are aborted.
    pub async fn shutdown(mut self, timeout: Duration) {
        self.cancel.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(timeout, async move {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Background task failed");
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Background services did not stop in time, aborting"
            );
            self.tasks.abort_all();
        }
        tracing::info!("Background services stopped");
    }
}
