//! Notification entity models and DTOs.

use nrc_core::types::{Attributes, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

/// A row from the `notifications` table. Serialized as-is, this is the
/// document POSTed to subscriber callbacks.
#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: EntityId,
    pub channel: String,
    pub attrs: Json<Attributes>,
    pub resource_url: String,
    pub created_at: Timestamp,
}

/// Insert payload for a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub channel: String,
    pub attrs: Attributes,
    pub resource_url: String,
}

/// Request body for `POST /notifications`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PublishNotification {
    #[validate(length(min = 1))]
    pub channel: String,
    #[serde(default)]
    pub attrs: Attributes,
    #[validate(url)]
    pub resource_url: String,
}

impl From<PublishNotification> for NewNotification {
    fn from(input: PublishNotification) -> Self {
        Self {
            channel: input.channel,
            attrs: input.attrs,
            resource_url: input.resource_url,
        }
    }
}
