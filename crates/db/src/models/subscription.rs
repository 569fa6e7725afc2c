//! Subscription entity models and DTOs.

use nrc_core::filter::{self, FilterGroup};
use nrc_core::types::{Attributes, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

/// A row from the `subscriptions` table.
#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: EntityId,
    pub channel: String,
    pub callback_url: String,
    /// Value sent verbatim as the `Authorization` header. Never echoed back.
    #[serde(skip_serializing)]
    pub auth: Option<String>,
    pub filters: Json<Vec<FilterGroup>>,
    pub owner: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Whether a notification carrying `attrs` should be delivered here.
    pub fn matches(&self, attrs: &Attributes) -> bool {
        filter::matches(&self.filters.0, attrs)
    }
}

/// Insert payload for a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub channel: String,
    pub callback_url: String,
    pub auth: Option<String>,
    pub filters: Vec<FilterGroup>,
    pub owner: String,
}

/// Fields that may change on an existing subscription. The outer `None`
/// keeps the current value; `auth: Some(None)` clears the header.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChanges {
    pub callback_url: Option<String>,
    pub auth: Option<Option<String>>,
    pub filters: Option<Vec<FilterGroup>>,
}

/// Request body for `POST /subscriptions`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscription {
    #[validate(length(min = 1))]
    pub channel: String,
    #[validate(url)]
    pub callback_url: String,
    pub auth: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterGroup>,
}

impl CreateSubscription {
    pub fn into_new(self, owner: impl Into<String>) -> NewSubscription {
        NewSubscription {
            channel: self.channel,
            callback_url: self.callback_url,
            auth: self.auth,
            filters: self.filters,
            owner: owner.into(),
        }
    }
}

/// Request body for `PUT /subscriptions/{id}`: a full replacement. The
/// channel must repeat the current one; it cannot be moved.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSubscription {
    #[validate(length(min = 1))]
    pub channel: String,
    #[validate(url)]
    pub callback_url: String,
    pub auth: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterGroup>,
}

impl From<ReplaceSubscription> for SubscriptionChanges {
    fn from(input: ReplaceSubscription) -> Self {
        Self {
            callback_url: Some(input.callback_url),
            auth: Some(input.auth),
            filters: Some(input.filters),
        }
    }
}

/// Request body for `PATCH /subscriptions/{id}`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatchSubscription {
    #[validate(url)]
    pub callback_url: Option<String>,
    pub auth: Option<String>,
    pub filters: Option<Vec<FilterGroup>>,
}

impl From<PatchSubscription> for SubscriptionChanges {
    fn from(input: PatchSubscription) -> Self {
        Self {
            callback_url: input.callback_url,
            auth: input.auth.map(Some),
            filters: input.filters,
        }
    }
}
