//! Delivery dispatcher.
//!
//! Consumes dispatch jobs, records one delivery attempt per matching
//! subscription, acknowledges the job and then delivers every attempt in
//! its own task. A periodic scan re-delivers attempts whose retry time has
//! come, and attempts stranded `in_flight` by a crashed process once their
//! lease expires.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use nrc_core::config::DispatchConfig;
use nrc_core::delivery::DeliveryStatus;
use nrc_core::retry::{BackoffPolicy, RetryDecision};
use nrc_core::types::{EntityId, Timestamp};
use nrc_db::models::delivery_attempt::{AttemptUpdate, DeliveryAttempt, NewDeliveryAttempt};
use nrc_db::models::notification::Notification;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::broker::{self, Broker, ClaimedJob};
use crate::bus::{DeliveryEvent, EventBus};
use crate::delivery::webhook::{DeliveryError, WebhookDelivery};
use crate::index::SubscriptionIndex;
use crate::store::{NotificationStore, StoreError};

/// Maximum number of due attempts picked up per retry scan.
const RETRY_SCAN_BATCH: i64 = 100;

type DeliveryTasks = JoinSet<Result<Option<DeliveryAttempt>, StoreError>>;

/// `from + by`, saturating at `from` if the sum is not representable.
fn offset(from: Timestamp, by: Duration) -> Timestamp {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(from)
}

#[derive(Clone)]
pub struct DeliveryDispatcher {
    store: Arc<dyn NotificationStore>,
    index: Arc<SubscriptionIndex>,
    broker: Arc<dyn Broker>,
    webhook: Arc<WebhookDelivery>,
    events: Arc<EventBus>,
    config: Arc<DispatchConfig>,
    policy: BackoffPolicy,
}

impl DeliveryDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        index: Arc<SubscriptionIndex>,
        broker: Arc<dyn Broker>,
        events: Arc<EventBus>,
        config: DispatchConfig,
    ) -> Result<Self, reqwest::Error> {
        let webhook = WebhookDelivery::new(config.delivery_timeout())?;
        Ok(Self {
            store,
            index,
            broker,
            webhook: Arc::new(webhook),
            events,
            policy: config.backoff_policy(),
            config: Arc::new(config),
        })
    }

    /// Run the job consumers and the retry scan until `cancel` fires.
    ///
    /// Attempts already in flight when cancellation arrives run to
    /// completion (bounded by the delivery timeout).
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            concurrency = self.config.dispatch_concurrency,
            max_attempts = self.config.max_delivery_attempts,
            "Delivery dispatcher started"
        );

        let mut tasks = JoinSet::new();
        for worker in 0..self.config.dispatch_concurrency {
            let this = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { this.consume_jobs(worker, cancel).await });
        }
        let this = self.clone();
        tasks.spawn(async move { this.retry_loop(cancel).await });

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Dispatcher task failed");
            }
        }
        tracing::info!("Delivery dispatcher stopped");
    }

    async fn consume_jobs(&self, worker: usize, cancel: CancellationToken) {
        let mut jobs = broker::consume(
            Arc::clone(&self.broker),
            self.config.poll_interval(),
            cancel,
        );
        while let Some(claimed) = jobs.next().await {
            tracing::debug!(
                worker,
                notification_id = %claimed.job.notification_id,
                deliveries = claimed.deliveries,
                "Dispatch job claimed"
            );
            self.handle_job(claimed).await;
        }
    }

    async fn retry_loop(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.retry_scan_interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.retry_due().await {
                        tracing::error!(error = %e, "Retry scan failed");
                    }
                }
            }
        }
    }

    /// Process one claimed job end to end.
    ///
    /// The job is acknowledged once the attempts are recorded; if recording
    /// fails it is released for another try.
    pub async fn handle_job(&self, claimed: ClaimedJob) {
        let notification_id = claimed.job.notification_id;
        match self.dispatch(notification_id).await {
            Ok(matched) => {
                if let Err(e) = self.broker.ack(&claimed).await {
                    // The job will be handed out again; recording is idempotent.
                    tracing::warn!(%notification_id, error = %e, "Failed to acknowledge dispatch job");
                }
                if let Some((notification, attempts)) = matched {
                    let mut tasks = DeliveryTasks::new();
                    self.spawn_deliveries(&mut tasks, Arc::new(notification), attempts);
                    Self::drain(tasks).await;
                }
            }
            Err(e) => {
                tracing::warn!(%notification_id, error = %e, "Dispatch failed, releasing job");
                if let Err(e) = self.broker.release(&claimed).await {
                    tracing::warn!(%notification_id, error = %e, "Failed to release dispatch job");
                }
            }
        }
    }

    /// Match a notification against its channel's subscriptions and record
    /// one attempt per match.
    ///
    /// Returns `None` if the notification no longer exists. Running this
    /// twice for the same notification returns the same attempts.
    pub async fn dispatch(
        &self,
        notification_id: EntityId,
    ) -> Result<Option<(Notification, Vec<DeliveryAttempt>)>, StoreError> {
        let notification = match self.store.get_notification(notification_id).await {
            Ok(notification) => notification,
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(%notification_id, "Dispatch job for unknown notification, dropping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let candidates = self.index.subscriptions_for(&notification.channel).await?;
        let lease_until = offset(Utc::now(), self.config.delivery_lease());

        let mut attempts = Vec::new();
        for subscription in candidates
            .iter()
            .filter(|s| s.matches(&notification.attrs.0))
        {
            let attempt = self
                .store
                .record_delivery_attempt(NewDeliveryAttempt {
                    notification_id: notification.id,
                    subscription_id: subscription.id,
                    callback_url: subscription.callback_url.clone(),
                    auth: subscription.auth.clone(),
                    next_retry_at: lease_until,
                })
                .await?;
            attempts.push(attempt);
        }

        tracing::debug!(
            %notification_id,
            channel = %notification.channel,
            candidates = candidates.len(),
            matched = attempts.len(),
            "Notification matched"
        );
        Ok(Some((notification, attempts)))
    }

    fn spawn_deliveries(
        &self,
        tasks: &mut DeliveryTasks,
        notification: Arc<Notification>,
        attempts: Vec<DeliveryAttempt>,
    ) {
        for attempt in attempts.into_iter().filter(|a| !a.status.is_terminal()) {
            let this = self.clone();
            let notification = Arc::clone(&notification);
            tasks.spawn(async move { this.deliver_attempt(&notification, attempt.id).await });
        }
    }

    /// Wait for every delivery task. One failing or panicking task does not
    /// affect the others.
    async fn drain(mut tasks: DeliveryTasks) {
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Failed to record delivery outcome");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Delivery task panicked");
                }
            }
        }
    }

    /// Claim one attempt, send it and record the outcome.
    ///
    /// Returns `None` when the attempt is not claimable (already delivered,
    /// terminal, or leased to someone else) or the lease was lost before
    /// the outcome could be written.
    pub async fn deliver_attempt(
        &self,
        notification: &Notification,
        attempt_id: EntityId,
    ) -> Result<Option<DeliveryAttempt>, StoreError> {
        let now = Utc::now();
        let lease_until = offset(now, self.config.delivery_lease());
        let Some(attempt) = self
            .store
            .claim_delivery_attempt(attempt_id, now, lease_until)
            .await?
        else {
            tracing::debug!(%attempt_id, "Attempt not claimable, skipping");
            return Ok(None);
        };

        let result = self
            .webhook
            .send(
                &attempt.callback_url,
                attempt.auth.as_deref(),
                notification,
                attempt.subscription_id,
            )
            .await;
        let update = self.outcome(&attempt, result);

        let Some(settled) = self.store.update_delivery_attempt(attempt.id, update).await? else {
            tracing::warn!(%attempt_id, "Lease lost before delivery outcome was recorded");
            return Ok(None);
        };
        self.report(&settled);
        Ok(Some(settled))
    }

    fn outcome(
        &self,
        attempt: &DeliveryAttempt,
        result: Result<u16, DeliveryError>,
    ) -> AttemptUpdate {
        let error = match result {
            Ok(status) => {
                return AttemptUpdate {
                    status: DeliveryStatus::Delivered,
                    last_status_code: Some(i32::from(status)),
                    last_error: None,
                    next_retry_at: None,
                };
            }
            Err(e) => e,
        };

        let last_status_code = error.status().map(i32::from);
        if !error.is_retryable() {
            return AttemptUpdate {
                status: DeliveryStatus::FailedTerminal,
                last_status_code,
                last_error: Some(error.to_string()),
                next_retry_at: None,
            };
        }

        let sends = u32::try_from(attempt.attempt_count).unwrap_or(u32::MAX);
        match self.policy.decide(sends) {
            RetryDecision::RetryAfter(delay) => AttemptUpdate {
                status: DeliveryStatus::FailedRetryable,
                last_status_code,
                last_error: Some(error.to_string()),
                next_retry_at: Some(offset(Utc::now(), delay)),
            },
            RetryDecision::GiveUp => AttemptUpdate {
                status: DeliveryStatus::FailedTerminal,
                last_status_code,
                last_error: Some(format!("{error} (gave up after {sends} attempts)")),
                next_retry_at: None,
            },
        }
    }

    fn report(&self, attempt: &DeliveryAttempt) {
        match attempt.status {
            DeliveryStatus::Delivered => tracing::info!(
                attempt_id = %attempt.id,
                notification_id = %attempt.notification_id,
                subscription_id = %attempt.subscription_id,
                attempt_count = attempt.attempt_count,
                "Notification delivered"
            ),
            DeliveryStatus::FailedRetryable => tracing::warn!(
                attempt_id = %attempt.id,
                notification_id = %attempt.notification_id,
                subscription_id = %attempt.subscription_id,
                attempt_count = attempt.attempt_count,
                error = attempt.last_error.as_deref().unwrap_or_default(),
                next_retry_at = ?attempt.next_retry_at,
                "Delivery failed, retry scheduled"
            ),
            DeliveryStatus::FailedTerminal => tracing::error!(
                attempt_id = %attempt.id,
                notification_id = %attempt.notification_id,
                subscription_id = %attempt.subscription_id,
                callback_url = %attempt.callback_url,
                attempt_count = attempt.attempt_count,
                status_code = ?attempt.last_status_code,
                error = attempt.last_error.as_deref().unwrap_or_default(),
                "Delivery failed permanently"
            ),
            DeliveryStatus::Pending | DeliveryStatus::InFlight => {}
        }

        if let Some(event) = DeliveryEvent::from_attempt(attempt) {
            self.events.publish(event);
        }
    }

    /// Deliver every attempt whose retry time has come. Returns how many
    /// attempts were picked up.
    pub async fn retry_due(&self) -> Result<usize, StoreError> {
        let due = self
            .store
            .due_delivery_attempts(Utc::now(), RETRY_SCAN_BATCH)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }

        let count = due.len();
        let mut by_notification: BTreeMap<EntityId, Vec<DeliveryAttempt>> = BTreeMap::new();
        for attempt in due {
            by_notification
                .entry(attempt.notification_id)
                .or_default()
                .push(attempt);
        }

        let mut tasks = DeliveryTasks::new();
        for (notification_id, attempts) in by_notification {
            match self.store.get_notification(notification_id).await {
                Ok(notification) => {
                    self.spawn_deliveries(&mut tasks, Arc::new(notification), attempts)
                }
                Err(e) => {
                    tracing::warn!(%notification_id, error = %e, "Cannot retry attempts, notification unavailable");
                }
            }
        }
        Self::drain(tasks).await;

        tracing::debug!(count, "Retry scan delivered due attempts");
        Ok(count)
    }
}
