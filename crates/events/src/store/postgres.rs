//! [`NotificationStore`] over the `nrc-db` repositories.

use async_trait::async_trait;
use nrc_core::types::{EntityId, Timestamp};
use nrc_db::models::channel::{Channel, ChannelChanges, NewChannel};
use nrc_db::models::delivery_attempt::{AttemptUpdate, DeliveryAttempt, NewDeliveryAttempt};
use nrc_db::models::notification::{NewNotification, Notification};
use nrc_db::models::subscription::{NewSubscription, Subscription, SubscriptionChanges};
use nrc_db::repositories::{
    ChannelRepo, DeliveryAttemptRepo, NotificationRepo, SubscriptionRepo,
};
use nrc_db::DbPool;

use super::{NotificationStore, StoreError};

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a notification and its `dispatch_jobs` row in one
    /// transaction, so an accepted notification always has a queued job.
    pub async fn append_notification_with_job(
        &self,
        id: EntityId,
        input: NewNotification,
        job_payload: &serde_json::Value,
    ) -> Result<Notification, StoreError> {
        NotificationRepo::create_with_job(&self.pool, id, &input, job_payload)
            .await
            .map_err(classify)
    }
}

/// Map a database error onto the store's error categories.
///
/// - Unique violations (`23505`) on `uq_*` constraints become `Conflict`.
/// - Foreign key violations (`23503`) become `Conflict`.
/// - Everything else is a backend failure.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                return StoreError::Conflict(match constraint {
                    "uq_channels_name" => "A channel with this name already exists".to_string(),
                    "uq_delivery_attempts_pair" => {
                        "A delivery attempt for this pair already exists".to_string()
                    }
                    other => format!("Duplicate value violates {other}"),
                });
            }
            Some("23503") => {
                return StoreError::Conflict(
                    "The record is still referenced by other records".to_string(),
                );
            }
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        nrc_db::health_check(&self.pool).await.map_err(classify)
    }

    async fn get_channel(&self, name: &str) -> Result<Channel, StoreError> {
        ChannelRepo::find_by_name(&self.pool, name)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("Channel", name))
    }

    async fn get_channel_by_id(&self, id: EntityId) -> Result<Channel, StoreError> {
        ChannelRepo::find_by_id(&self.pool, id)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("Channel", id))
    }

    async fn list_channels(
        &self,
        name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Channel>, StoreError> {
        ChannelRepo::list(&self.pool, name, limit, offset)
            .await
            .map_err(classify)
    }

    async fn create_channel(&self, input: NewChannel) -> Result<Channel, StoreError> {
        ChannelRepo::create(&self.pool, &input).await.map_err(classify)
    }

    async fn update_channel(
        &self,
        id: EntityId,
        changes: ChannelChanges,
    ) -> Result<Channel, StoreError> {
        ChannelRepo::update(&self.pool, id, &changes)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("Channel", id))
    }

    async fn delete_channel(&self, id: EntityId) -> Result<(), StoreError> {
        if ChannelRepo::delete(&self.pool, id).await.map_err(classify)? {
            Ok(())
        } else {
            Err(StoreError::not_found("Channel", id))
        }
    }

    async fn get_subscriptions_by_channel(
        &self,
        channel: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        SubscriptionRepo::list_by_channel(&self.pool, channel)
            .await
            .map_err(classify)
    }

    async fn get_subscription(&self, id: EntityId) -> Result<Subscription, StoreError> {
        SubscriptionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("Subscription", id))
    }

    async fn list_subscriptions(
        &self,
        channel: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Subscription>, StoreError> {
        SubscriptionRepo::list(&self.pool, channel, limit, offset)
            .await
            .map_err(classify)
    }

    async fn create_subscription(
        &self,
        input: NewSubscription,
    ) -> Result<Subscription, StoreError> {
        SubscriptionRepo::create(&self.pool, &input)
            .await
            .map_err(classify)
    }

    async fn update_subscription(
        &self,
        id: EntityId,
        changes: SubscriptionChanges,
    ) -> Result<Subscription, StoreError> {
        SubscriptionRepo::update(&self.pool, id, &changes)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("Subscription", id))
    }

    async fn delete_subscription(&self, id: EntityId) -> Result<Subscription, StoreError> {
        SubscriptionRepo::delete(&self.pool, id)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("Subscription", id))
    }

    async fn append_notification(
        &self,
        input: NewNotification,
    ) -> Result<Notification, StoreError> {
        NotificationRepo::create(&self.pool, &input)
            .await
            .map_err(classify)
    }

    async fn get_notification(&self, id: EntityId) -> Result<Notification, StoreError> {
        NotificationRepo::find_by_id(&self.pool, id)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("Notification", id))
    }

    async fn delete_notification(&self, id: EntityId) -> Result<(), StoreError> {
        if NotificationRepo::delete(&self.pool, id).await.map_err(classify)? {
            Ok(())
        } else {
            Err(StoreError::not_found("Notification", id))
        }
    }

    async fn purge_notifications(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        NotificationRepo::delete_expired(&self.pool, cutoff)
            .await
            .map_err(classify)
    }

    async fn record_delivery_attempt(
        &self,
        input: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, StoreError> {
        DeliveryAttemptRepo::record(&self.pool, &input)
            .await
            .map_err(classify)
    }

    async fn get_delivery_attempt(&self, id: EntityId) -> Result<DeliveryAttempt, StoreError> {
        DeliveryAttemptRepo::find_by_id(&self.pool, id)
            .await
            .map_err(classify)?
            .ok_or_else(|| StoreError::not_found("DeliveryAttempt", id))
    }

    async fn list_delivery_attempts(
        &self,
        notification_id: EntityId,
    ) -> Result<Vec<DeliveryAttempt>, StoreError> {
        DeliveryAttemptRepo::list_by_notification(&self.pool, notification_id)
            .await
            .map_err(classify)
    }

    async fn claim_delivery_attempt(
        &self,
        id: EntityId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> Result<Option<DeliveryAttempt>, StoreError> {
        DeliveryAttemptRepo::claim(&self.pool, id, now, lease_until)
            .await
            .map_err(classify)
    }

    async fn update_delivery_attempt(
        &self,
        id: EntityId,
        update: AttemptUpdate,
    ) -> Result<Option<DeliveryAttempt>, StoreError> {
        DeliveryAttemptRepo::update(&self.pool, id, &update)
            .await
            .map_err(classify)
    }

    async fn due_delivery_attempts(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DeliveryAttempt>, StoreError> {
        DeliveryAttemptRepo::list_due(&self.pool, now, limit)
            .await
            .map_err(classify)
    }

    async fn reset_delivery_attempt(
        &self,
        id: EntityId,
    ) -> Result<Option<DeliveryAttempt>, StoreError> {
        DeliveryAttemptRepo::replay(&self.pool, id)
            .await
            .map_err(classify)
    }
}
