//! Repository for the `channels` table.

use nrc_core::types::{new_id, EntityId};
use sqlx::PgPool;

use crate::models::channel::{Channel, ChannelChanges, NewChannel};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, filters, documentation_url, owner, created_at, updated_at";

/// Provides CRUD operations for channels.
pub struct ChannelRepo;

impl ChannelRepo {
    /// Insert a new channel. Fails with a `uq_channels_name` violation if
    /// the name is taken.
    pub async fn create(pool: &PgPool, input: &NewChannel) -> Result<Channel, sqlx::Error> {
        let query = format!(
            "INSERT INTO channels (id, name, filters, documentation_url, owner) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Channel>(&query)
            .bind(new_id())
            .bind(&input.name)
            .bind(&input.filters)
            .bind(&input.documentation_url)
            .bind(&input.owner)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: EntityId) -> Result<Option<Channel>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM channels WHERE id = $1");
        sqlx::query_as::<_, Channel>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Channel>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM channels WHERE name = $1");
        sqlx::query_as::<_, Channel>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// List channels ordered by name, optionally restricted to an exact name.
    pub async fn list(
        pool: &PgPool,
        name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Channel>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM channels \
             WHERE ($1::TEXT IS NULL OR name = $1) \
             ORDER BY name ASC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Channel>(&query)
            .bind(name)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Apply changes to a channel. Returns `None` if it does not exist.
    pub async fn update(
        pool: &PgPool,
        id: EntityId,
        changes: &ChannelChanges,
    ) -> Result<Option<Channel>, sqlx::Error> {
        let query = format!(
            "UPDATE channels SET \
                 filters = COALESCE($2, filters), \
                 documentation_url = COALESCE($3, documentation_url), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Channel>(&query)
            .bind(id)
            .bind(&changes.filters)
            .bind(&changes.documentation_url)
            .fetch_optional(pool)
            .await
    }

    /// Delete a channel. Fails with a foreign key violation while
    /// subscriptions still reference it.
    pub async fn delete(pool: &PgPool, id: EntityId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
