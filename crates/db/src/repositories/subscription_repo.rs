//! Repository for the `subscriptions` table.

use nrc_core::types::{new_id, EntityId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::subscription::{NewSubscription, Subscription, SubscriptionChanges};

const COLUMNS: &str = "id, channel, callback_url, auth, filters, owner, created_at, updated_at";

/// Provides CRUD operations for subscriptions.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    pub async fn create(
        pool: &PgPool,
        input: &NewSubscription,
    ) -> Result<Subscription, sqlx::Error> {
        let query = format!(
            "INSERT INTO subscriptions (id, channel, callback_url, auth, filters, owner) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(new_id())
            .bind(&input.channel)
            .bind(&input.callback_url)
            .bind(&input.auth)
            .bind(Json(&input.filters))
            .bind(&input.owner)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: EntityId,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscriptions WHERE id = $1");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All subscriptions of a channel, oldest first (ties broken by id).
    pub async fn list_by_channel(
        pool: &PgPool,
        channel: &str,
    ) -> Result<Vec<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions \
             WHERE channel = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(channel)
            .fetch_all(pool)
            .await
    }

    /// Paginated listing, optionally restricted to one channel.
    pub async fn list(
        pool: &PgPool,
        channel: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions \
             WHERE ($1::TEXT IS NULL OR channel = $1) \
             ORDER BY created_at ASC, id ASC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(channel)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Apply changes. `auth` is only written when `changes.auth` is `Some`,
    /// which allows clearing it with `Some(None)`.
    pub async fn update(
        pool: &PgPool,
        id: EntityId,
        changes: &SubscriptionChanges,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET \
                 callback_url = COALESCE($2, callback_url), \
                 auth = CASE WHEN $3 THEN $4 ELSE auth END, \
                 filters = COALESCE($5, filters), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(&changes.callback_url)
            .bind(changes.auth.is_some())
            .bind(changes.auth.clone().flatten())
            .bind(changes.filters.as_ref().map(Json))
            .fetch_optional(pool)
            .await
    }

    /// Delete a subscription, returning the removed row.
    pub async fn delete(
        pool: &PgPool,
        id: EntityId,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!("DELETE FROM subscriptions WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
