//! Delivery attempt entity models.

use nrc_core::delivery::DeliveryStatus;
use nrc_core::types::{EntityId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `delivery_attempts` table.
///
/// `callback_url` and `auth` are copies taken when the subscription was
/// matched; later subscription edits do not reach existing attempts.
#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    pub id: EntityId,
    pub notification_id: EntityId,
    pub subscription_id: EntityId,
    pub callback_url: String,
    #[serde(skip_serializing)]
    pub auth: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: DeliveryStatus,
    pub attempt_count: i32,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
    pub last_attempted_at: Option<Timestamp>,
    pub next_retry_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a delivery attempt. `next_retry_at` is the lease
/// protecting the fresh attempt from the retry scan until the dispatcher
/// that recorded it has had its chance.
#[derive(Debug, Clone)]
pub struct NewDeliveryAttempt {
    pub notification_id: EntityId,
    pub subscription_id: EntityId,
    pub callback_url: String,
    pub auth: Option<String>,
    pub next_retry_at: Timestamp,
}

/// Outcome written after a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptUpdate {
    pub status: DeliveryStatus,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<Timestamp>,
}
