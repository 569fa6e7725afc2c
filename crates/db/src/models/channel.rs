//! Channel entity models and DTOs.

use nrc_core::types::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `channels` table.
#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: EntityId,
    pub name: String,
    /// Declared attribute names, in declaration order.
    pub filters: Vec<String>,
    pub documentation_url: Option<String>,
    pub owner: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a channel. The owner comes from the caller, never
/// from the request body.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub filters: Vec<String>,
    pub documentation_url: Option<String>,
    pub owner: String,
}

/// Fields that may change on an existing channel. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default)]
pub struct ChannelChanges {
    pub filters: Option<Vec<String>>,
    pub documentation_url: Option<String>,
}

/// Request body for `POST /channels`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannel {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub filters: Vec<String>,
    #[validate(url)]
    pub documentation_url: Option<String>,
}

impl CreateChannel {
    pub fn into_new(self, owner: impl Into<String>) -> NewChannel {
        NewChannel {
            name: self.name,
            filters: self.filters,
            documentation_url: self.documentation_url,
            owner: owner.into(),
        }
    }
}

/// Request body for `PUT`/`PATCH /channels/{id}`. The name is immutable.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChannel {
    pub filters: Option<Vec<String>>,
    #[validate(url)]
    pub documentation_url: Option<String>,
}

impl From<UpdateChannel> for ChannelChanges {
    fn from(input: UpdateChannel) -> Self {
        Self {
            filters: input.filters,
            documentation_url: input.documentation_url,
        }
    }
}
