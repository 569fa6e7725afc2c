//! Publish pipeline: validate, record, enqueue.

use std::sync::Arc;

use nrc_core::error::CoreError;
use nrc_core::filter::{self, FilterGroup};
use nrc_core::schema;
use nrc_core::types::new_id;
use nrc_db::models::channel::Channel;
use nrc_db::models::notification::{NewNotification, Notification, PublishNotification};
use validator::Validate;

use crate::broker::{Broker, BrokerError, DispatchJob};
use crate::store::{NotificationStore, PgStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Channel '{0}' does not exist")]
    UnknownChannel(String),

    #[error("Channel '{channel}' does not declare attribute(s): {}", .keys.join(", "))]
    UndeclaredAttribute { channel: String, keys: Vec<String> },

    /// Malformed input or filter groups referencing undeclared keys.
    #[error(transparent)]
    Invalid(CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The dispatch job could not be queued; nothing was published.
    #[error("Dispatch queue unavailable: {0}")]
    BrokerUnavailable(#[source] BrokerError),
}

impl From<RoutingError> for CoreError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::UnknownChannel(name) => CoreError::NotFound {
                entity: "Channel",
                id: name,
            },
            RoutingError::UndeclaredAttribute { channel, keys } => {
                CoreError::InvalidParams(schema::undeclared_attribute_errors(&channel, &keys))
            }
            RoutingError::Invalid(core) => core,
            RoutingError::Store(store) => store.into(),
            RoutingError::BrokerUnavailable(e) => CoreError::Unavailable(e.to_string()),
        }
    }
}

/// Where accepted notifications get their dispatch job.
#[derive(Clone)]
enum JobSink {
    /// A separate broker. A notification whose job it rejects is withdrawn.
    Broker(Arc<dyn Broker>),
    /// `dispatch_jobs` in the notification database, written in the same
    /// transaction as the notification.
    Outbox(PgStore),
}

/// Validates inbound notifications against their channel schema, appends
/// them to the log and enqueues a dispatch job.
///
/// From the caller's side recording and enqueueing are one step: a publish
/// either returns a notification that will be dispatched, or an error and
/// no notification.
#[derive(Clone)]
pub struct PublishPipeline {
    store: Arc<dyn NotificationStore>,
    jobs: JobSink,
}

impl PublishPipeline {
    pub fn new(store: Arc<dyn NotificationStore>, broker: Arc<dyn Broker>) -> Self {
        Self {
            store,
            jobs: JobSink::Broker(broker),
        }
    }

    /// Pipeline whose jobs land in the store's own `dispatch_jobs` table,
    /// to be consumed by a [`PgBroker`](crate::broker::PgBroker) on the
    /// same database.
    pub fn with_outbox(store: PgStore) -> Self {
        Self {
            store: Arc::new(store.clone()),
            jobs: JobSink::Outbox(store),
        }
    }

    async fn resolve_channel(&self, name: &str) -> Result<Channel, RoutingError> {
        match self.store.get_channel(name).await {
            Ok(channel) => Ok(channel),
            Err(StoreError::NotFound { .. }) => Err(RoutingError::UnknownChannel(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Publish a notification.
    ///
    /// Nothing is written unless the channel exists and every attribute is
    /// declared on it. If the job cannot be queued the caller gets
    /// [`RoutingError::BrokerUnavailable`], no notification remains, and a
    /// retry is safe.
    pub async fn publish(&self, input: PublishNotification) -> Result<Notification, RoutingError> {
        input
            .validate()
            .map_err(|e| RoutingError::Invalid(e.into()))?;

        let channel = self.resolve_channel(&input.channel).await?;
        let undeclared = schema::undeclared_attributes(&channel.filters, &input.attrs);
        if !undeclared.is_empty() {
            return Err(RoutingError::UndeclaredAttribute {
                channel: channel.name,
                keys: undeclared,
            });
        }

        let notification = match &self.jobs {
            JobSink::Outbox(store) => {
                let id = new_id();
                let payload = serde_json::to_value(DispatchJob {
                    notification_id: id,
                })
                .map_err(|e| RoutingError::BrokerUnavailable(e.into()))?;
                store
                    .append_notification_with_job(id, NewNotification::from(input), &payload)
                    .await?
            }
            JobSink::Broker(broker) => {
                let notification = self
                    .store
                    .append_notification(NewNotification::from(input))
                    .await?;
                let job = DispatchJob {
                    notification_id: notification.id,
                };
                if let Err(e) = broker.enqueue(job).await {
                    self.withdraw(&notification).await;
                    return Err(RoutingError::BrokerUnavailable(e));
                }
                notification
            }
        };

        tracing::info!(
            notification_id = %notification.id,
            channel = %notification.channel,
            "Notification published"
        );
        Ok(notification)
    }

    async fn withdraw(&self, notification: &Notification) {
        match self.store.delete_notification(notification.id).await {
            Ok(()) => tracing::warn!(
                notification_id = %notification.id,
                channel = %notification.channel,
                "Dispatch job could not be enqueued, notification withdrawn"
            ),
            Err(e) => tracing::error!(
                notification_id = %notification.id,
                channel = %notification.channel,
                error = %e,
                "Dispatch job could not be enqueued and the notification could not be withdrawn"
            ),
        }
    }

    /// Check subscription filter groups against the channel they target.
    ///
    /// Returns the channel so callers can reuse it.
    pub async fn validate_subscription_filters(
        &self,
        channel: &str,
        groups: &[FilterGroup],
    ) -> Result<Channel, RoutingError> {
        let channel = self.resolve_channel(channel).await?;
        filter::validate_filter_groups(&channel.filters, groups).map_err(RoutingError::Invalid)?;
        Ok(channel)
    }
}
