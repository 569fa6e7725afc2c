//! Data-access interface for the routing engine.
//!
//! The engine never sees SQL. Everything it persists goes through
//! [`NotificationStore`], implemented by [`PgStore`] for production and
//! [`MemoryStore`] for tests and single-process development.

use async_trait::async_trait;
use nrc_core::error::CoreError;
use nrc_core::types::{EntityId, Timestamp};
use nrc_db::models::channel::{Channel, ChannelChanges, NewChannel};
use nrc_db::models::delivery_attempt::{AttemptUpdate, DeliveryAttempt, NewDeliveryAttempt};
use nrc_db::models::notification::{NewNotification, Notification};
use nrc_db::models::subscription::{NewSubscription, Subscription, SubscriptionChanges};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness or referential rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Backend(msg) => CoreError::Internal(msg),
        }
    }
}

/// Persistence operations needed by the publish pipeline, the dispatcher
/// and the HTTP API.
///
/// Lookups by key return [`StoreError::NotFound`] for missing rows.
/// Conditional writes on delivery attempts return `Ok(None)` when the
/// condition does not hold.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Cheap liveness probe of the backend.
    async fn ping(&self) -> Result<(), StoreError>;

    // -- channels ----------------------------------------------------------

    async fn get_channel(&self, name: &str) -> Result<Channel, StoreError>;
    async fn get_channel_by_id(&self, id: EntityId) -> Result<Channel, StoreError>;
    async fn list_channels(
        &self,
        name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Channel>, StoreError>;
    async fn create_channel(&self, input: NewChannel) -> Result<Channel, StoreError>;
    async fn update_channel(
        &self,
        id: EntityId,
        changes: ChannelChanges,
    ) -> Result<Channel, StoreError>;
    /// Fails with `Conflict` while subscriptions reference the channel.
    async fn delete_channel(&self, id: EntityId) -> Result<(), StoreError>;

    // -- subscriptions -----------------------------------------------------

    /// All subscriptions of a channel ordered by creation time, then id.
    async fn get_subscriptions_by_channel(
        &self,
        channel: &str,
    ) -> Result<Vec<Subscription>, StoreError>;
    async fn get_subscription(&self, id: EntityId) -> Result<Subscription, StoreError>;
    async fn list_subscriptions(
        &self,
        channel: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Subscription>, StoreError>;
    async fn create_subscription(&self, input: NewSubscription)
        -> Result<Subscription, StoreError>;
    async fn update_subscription(
        &self,
        id: EntityId,
        changes: SubscriptionChanges,
    ) -> Result<Subscription, StoreError>;
    /// Returns the removed subscription. Existing delivery attempts stay.
    async fn delete_subscription(&self, id: EntityId) -> Result<Subscription, StoreError>;

    // -- notifications -----------------------------------------------------

    async fn append_notification(&self, input: NewNotification)
        -> Result<Notification, StoreError>;
    async fn get_notification(&self, id: EntityId) -> Result<Notification, StoreError>;
    /// Withdraw a notification whose dispatch job could not be queued.
    async fn delete_notification(&self, id: EntityId) -> Result<(), StoreError>;
    /// Delete notifications older than `cutoff` whose attempts have all
    /// settled. Returns how many were removed.
    async fn purge_notifications(&self, cutoff: Timestamp) -> Result<u64, StoreError>;

    // -- delivery attempts -------------------------------------------------

    /// Idempotent per (notification, subscription): returns the existing
    /// attempt if one was already recorded.
    async fn record_delivery_attempt(
        &self,
        input: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, StoreError>;
    async fn get_delivery_attempt(&self, id: EntityId) -> Result<DeliveryAttempt, StoreError>;
    async fn list_delivery_attempts(
        &self,
        notification_id: EntityId,
    ) -> Result<Vec<DeliveryAttempt>, StoreError>;
    /// Move a claimable attempt to `in_flight` with a lease until
    /// `lease_until`, incrementing its counter.
    async fn claim_delivery_attempt(
        &self,
        id: EntityId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> Result<Option<DeliveryAttempt>, StoreError>;
    /// Write a send outcome to an `in_flight` attempt.
    async fn update_delivery_attempt(
        &self,
        id: EntityId,
        update: AttemptUpdate,
    ) -> Result<Option<DeliveryAttempt>, StoreError>;
    /// Attempts whose retry time (or lease) has passed.
    async fn due_delivery_attempts(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DeliveryAttempt>, StoreError>;
    /// Reset a `failed_terminal` attempt to `pending`, due immediately.
    async fn reset_delivery_attempt(
        &self,
        id: EntityId,
    ) -> Result<Option<DeliveryAttempt>, StoreError>;
}
