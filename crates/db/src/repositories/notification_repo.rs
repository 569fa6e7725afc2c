//! Repository for the append-only `notifications` log.

use nrc_core::types::{new_id, EntityId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::notification::{NewNotification, Notification};
use crate::repositories::DispatchJobRepo;

const COLUMNS: &str = "id, channel, attrs, resource_url, created_at";

pub struct NotificationRepo;

impl NotificationRepo {
    pub async fn create(
        pool: &PgPool,
        input: &NewNotification,
    ) -> Result<Notification, sqlx::Error> {
        let query = format!(
            "INSERT INTO notifications (id, channel, attrs, resource_url) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(new_id())
            .bind(&input.channel)
            .bind(Json(&input.attrs))
            .bind(&input.resource_url)
            .fetch_one(pool)
            .await
    }

    /// Insert a notification under a caller-chosen id together with its
    /// dispatch job, in one transaction.
    pub async fn create_with_job(
        pool: &PgPool,
        id: EntityId,
        input: &NewNotification,
        job_payload: &serde_json::Value,
    ) -> Result<Notification, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO notifications (id, channel, attrs, resource_url) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let notification = sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .bind(&input.channel)
            .bind(Json(&input.attrs))
            .bind(&input.resource_url)
            .fetch_one(&mut *tx)
            .await?;

        DispatchJobRepo::enqueue_in(&mut tx, job_payload).await?;

        tx.commit().await?;
        Ok(notification)
    }

    /// Remove a notification that never reached the dispatch queue.
    pub async fn delete(pool: &PgPool, id: EntityId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: EntityId,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1");
        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete notifications created before `cutoff` whose attempts have all
    /// settled. Attempts cascade with their notification.
    pub async fn delete_expired(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM notifications n \
             WHERE n.created_at < $1 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM delivery_attempts a \
                   WHERE a.notification_id = n.id \
                     AND a.status NOT IN ('delivered', 'failed_terminal') \
               )",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
