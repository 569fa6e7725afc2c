//! Process-local [`NotificationStore`].
//!
//! Mirrors the Postgres rules (unique channel names, restricted channel
//! deletion, one attempt per pair, conditional attempt writes) so that
//! tests against it say something about production.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use nrc_core::delivery::{DeliveryStatus, Transition};
use nrc_core::types::{new_id, EntityId, Timestamp};
use nrc_db::models::channel::{Channel, ChannelChanges, NewChannel};
use nrc_db::models::delivery_attempt::{AttemptUpdate, DeliveryAttempt, NewDeliveryAttempt};
use nrc_db::models::notification::{NewNotification, Notification};
use nrc_db::models::subscription::{NewSubscription, Subscription, SubscriptionChanges};
use sqlx::types::Json;
use tokio::sync::RwLock;

use super::{NotificationStore, StoreError};

#[derive(Default)]
struct Tables {
    channels: BTreeMap<EntityId, Channel>,
    subscriptions: BTreeMap<EntityId, Subscription>,
    notifications: BTreeMap<EntityId, Notification>,
    attempts: BTreeMap<EntityId, DeliveryAttempt>,
    /// (notification, subscription) -> attempt id
    attempt_pairs: HashMap<(EntityId, EntityId), EntityId>,
}

/// In-memory store for tests and `memory://` development mode.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications in the log.
    pub async fn notification_count(&self) -> usize {
        self.tables.read().await.notifications.len()
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.skip(offset).take(limit).collect()
}

fn by_creation(a: &Subscription, b: &Subscription) -> std::cmp::Ordering {
    (a.created_at, a.id).cmp(&(b.created_at, b.id))
}

fn is_claimable(attempt: &DeliveryAttempt, now: Timestamp) -> bool {
    let due = attempt.next_retry_at.is_some_and(|at| at <= now);
    match attempt.status {
        DeliveryStatus::Pending => true,
        DeliveryStatus::FailedRetryable | DeliveryStatus::InFlight => due,
        DeliveryStatus::Delivered | DeliveryStatus::FailedTerminal => false,
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_channel(&self, name: &str) -> Result<Channel, StoreError> {
        let tables = self.tables.read().await;
        tables
            .channels
            .values()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Channel", name))
    }

    async fn get_channel_by_id(&self, id: EntityId) -> Result<Channel, StoreError> {
        let tables = self.tables.read().await;
        tables
            .channels
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Channel", id))
    }

    async fn list_channels(
        &self,
        name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Channel>, StoreError> {
        let tables = self.tables.read().await;
        let mut channels: Vec<&Channel> = tables
            .channels
            .values()
            .filter(|c| name.map_or(true, |n| c.name == n))
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(channels.into_iter().cloned(), limit, offset))
    }

    async fn create_channel(&self, input: NewChannel) -> Result<Channel, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.channels.values().any(|c| c.name == input.name) {
            return Err(StoreError::Conflict(
                "A channel with this name already exists".into(),
            ));
        }
        let now = Utc::now();
        let channel = Channel {
            id: new_id(),
            name: input.name,
            filters: input.filters,
            documentation_url: input.documentation_url,
            owner: input.owner,
            created_at: now,
            updated_at: now,
        };
        tables.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn update_channel(
        &self,
        id: EntityId,
        changes: ChannelChanges,
    ) -> Result<Channel, StoreError> {
        let mut tables = self.tables.write().await;
        let channel = tables
            .channels
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Channel", id))?;
        if let Some(filters) = changes.filters {
            channel.filters = filters;
        }
        if let Some(url) = changes.documentation_url {
            channel.documentation_url = Some(url);
        }
        channel.updated_at = Utc::now();
        Ok(channel.clone())
    }

    async fn delete_channel(&self, id: EntityId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let name = tables
            .channels
            .get(&id)
            .map(|c| c.name.clone())
            .ok_or_else(|| StoreError::not_found("Channel", id))?;
        if tables.subscriptions.values().any(|s| s.channel == name) {
            return Err(StoreError::Conflict(
                "The record is still referenced by other records".into(),
            ));
        }
        tables.channels.remove(&id);
        Ok(())
    }

    async fn get_subscriptions_by_channel(
        &self,
        channel: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        let tables = self.tables.read().await;
        let mut subs: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.channel == channel)
            .cloned()
            .collect();
        subs.sort_by(by_creation);
        Ok(subs)
    }

    async fn get_subscription(&self, id: EntityId) -> Result<Subscription, StoreError> {
        let tables = self.tables.read().await;
        tables
            .subscriptions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Subscription", id))
    }

    async fn list_subscriptions(
        &self,
        channel: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Subscription>, StoreError> {
        let tables = self.tables.read().await;
        let mut subs: Vec<&Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| channel.map_or(true, |c| s.channel == c))
            .collect();
        subs.sort_by(|a, b| by_creation(a, b));
        Ok(page(subs.into_iter().cloned(), limit, offset))
    }

    async fn create_subscription(
        &self,
        input: NewSubscription,
    ) -> Result<Subscription, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.channels.values().any(|c| c.name == input.channel) {
            return Err(StoreError::not_found("Channel", &input.channel));
        }
        let now = Utc::now();
        let subscription = Subscription {
            id: new_id(),
            channel: input.channel,
            callback_url: input.callback_url,
            auth: input.auth,
            filters: Json(input.filters),
            owner: input.owner,
            created_at: now,
            updated_at: now,
        };
        tables
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription(
        &self,
        id: EntityId,
        changes: SubscriptionChanges,
    ) -> Result<Subscription, StoreError> {
        let mut tables = self.tables.write().await;
        let subscription = tables
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Subscription", id))?;
        if let Some(url) = changes.callback_url {
            subscription.callback_url = url;
        }
        if let Some(auth) = changes.auth {
            subscription.auth = auth;
        }
        if let Some(filters) = changes.filters {
            subscription.filters = Json(filters);
        }
        subscription.updated_at = Utc::now();
        Ok(subscription.clone())
    }

    async fn delete_subscription(&self, id: EntityId) -> Result<Subscription, StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .subscriptions
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("Subscription", id))
    }

    async fn append_notification(
        &self,
        input: NewNotification,
    ) -> Result<Notification, StoreError> {
        let mut tables = self.tables.write().await;
        let notification = Notification {
            id: new_id(),
            channel: input.channel,
            attrs: Json(input.attrs),
            resource_url: input.resource_url,
            created_at: Utc::now(),
        };
        tables
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get_notification(&self, id: EntityId) -> Result<Notification, StoreError> {
        let tables = self.tables.read().await;
        tables
            .notifications
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Notification", id))
    }

    async fn delete_notification(&self, id: EntityId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .notifications
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("Notification", id))
    }

    async fn purge_notifications(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let Tables {
            notifications,
            attempts,
            attempt_pairs,
            ..
        } = &mut *tables;

        let expired: Vec<EntityId> = notifications
            .values()
            .filter(|n| n.created_at < cutoff)
            .filter(|n| {
                attempts
                    .values()
                    .filter(|a| a.notification_id == n.id)
                    .all(|a| a.status.is_terminal())
            })
            .map(|n| n.id)
            .collect();

        for id in &expired {
            notifications.remove(id);
        }
        attempts.retain(|_, a| !expired.contains(&a.notification_id));
        attempt_pairs.retain(|(notification_id, _), _| !expired.contains(notification_id));
        Ok(expired.len() as u64)
    }

    async fn record_delivery_attempt(
        &self,
        input: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.notifications.contains_key(&input.notification_id) {
            return Err(StoreError::not_found("Notification", input.notification_id));
        }
        let key = (input.notification_id, input.subscription_id);
        if let Some(existing) = tables
            .attempt_pairs
            .get(&key)
            .and_then(|id| tables.attempts.get(id))
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let attempt = DeliveryAttempt {
            id: new_id(),
            notification_id: input.notification_id,
            subscription_id: input.subscription_id,
            callback_url: input.callback_url,
            auth: input.auth,
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            last_status_code: None,
            last_error: None,
            last_attempted_at: None,
            next_retry_at: Some(input.next_retry_at),
            created_at: now,
            updated_at: now,
        };
        tables.attempt_pairs.insert(key, attempt.id);
        tables.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn get_delivery_attempt(&self, id: EntityId) -> Result<DeliveryAttempt, StoreError> {
        let tables = self.tables.read().await;
        tables
            .attempts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("DeliveryAttempt", id))
    }

    async fn list_delivery_attempts(
        &self,
        notification_id: EntityId,
    ) -> Result<Vec<DeliveryAttempt>, StoreError> {
        let tables = self.tables.read().await;
        let mut attempts: Vec<DeliveryAttempt> = tables
            .attempts
            .values()
            .filter(|a| a.notification_id == notification_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| (a.created_at, a.id));
        Ok(attempts)
    }

    async fn claim_delivery_attempt(
        &self,
        id: EntityId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> Result<Option<DeliveryAttempt>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(attempt) = tables.attempts.get_mut(&id) else {
            return Ok(None);
        };
        if !is_claimable(attempt, now) {
            return Ok(None);
        }
        attempt.status = DeliveryStatus::InFlight;
        attempt.attempt_count += 1;
        attempt.last_attempted_at = Some(now);
        attempt.next_retry_at = Some(lease_until);
        attempt.updated_at = Utc::now();
        Ok(Some(attempt.clone()))
    }

    async fn update_delivery_attempt(
        &self,
        id: EntityId,
        update: AttemptUpdate,
    ) -> Result<Option<DeliveryAttempt>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(attempt) = tables.attempts.get_mut(&id) else {
            return Ok(None);
        };
        if attempt.status != DeliveryStatus::InFlight
            || attempt.status.transition_to(update.status) != Transition::Apply
        {
            return Ok(None);
        }
        attempt.status = update.status;
        attempt.last_status_code = update.last_status_code;
        attempt.last_error = update.last_error;
        attempt.next_retry_at = update.next_retry_at;
        attempt.updated_at = Utc::now();
        Ok(Some(attempt.clone()))
    }

    async fn due_delivery_attempts(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DeliveryAttempt>, StoreError> {
        let tables = self.tables.read().await;
        let mut due: Vec<&DeliveryAttempt> = tables
            .attempts
            .values()
            .filter(|a| !a.status.is_terminal())
            .filter(|a| a.next_retry_at.is_some_and(|at| at <= now))
            .collect();
        due.sort_by_key(|a| a.next_retry_at);
        Ok(page(due.into_iter().cloned(), limit, 0))
    }

    async fn reset_delivery_attempt(
        &self,
        id: EntityId,
    ) -> Result<Option<DeliveryAttempt>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(attempt) = tables.attempts.get_mut(&id) else {
            return Ok(None);
        };
        if attempt.status.transition_to(DeliveryStatus::Pending) != Transition::Apply {
            return Ok(None);
        }
        let now = Utc::now();
        attempt.status = DeliveryStatus::Pending;
        attempt.attempt_count = 0;
        attempt.last_error = None;
        attempt.next_retry_at = Some(now);
        attempt.updated_at = now;
        Ok(Some(attempt.clone()))
    }
}
