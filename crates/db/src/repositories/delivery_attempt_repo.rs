//! Repository for the `delivery_attempts` table.
//!
//! Status writes are conditional on the current status so that two
//! dispatchers racing on the same attempt cannot both win.

use nrc_core::delivery::{
    STATUS_FAILED_RETRYABLE, STATUS_FAILED_TERMINAL, STATUS_IN_FLIGHT, STATUS_PENDING,
};
use nrc_core::types::{new_id, EntityId, Timestamp};
use sqlx::PgPool;

use crate::models::delivery_attempt::{AttemptUpdate, DeliveryAttempt, NewDeliveryAttempt};

const COLUMNS: &str = "\
    id, notification_id, subscription_id, callback_url, auth, status, \
    attempt_count, last_status_code, last_error, last_attempted_at, \
    next_retry_at, created_at, updated_at";

/// Provides delivery attempt bookkeeping for the dispatcher.
pub struct DeliveryAttemptRepo;

impl DeliveryAttemptRepo {
    /// Record the attempt for a (notification, subscription) pair.
    ///
    /// Idempotent: if the pair already has an attempt, that row is returned
    /// unchanged.
    pub async fn record(
        pool: &PgPool,
        input: &NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, sqlx::Error> {
        let insert = format!(
            "INSERT INTO delivery_attempts \
                 (id, notification_id, subscription_id, callback_url, auth, status, next_retry_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT ON CONSTRAINT uq_delivery_attempts_pair DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, DeliveryAttempt>(&insert)
            .bind(new_id())
            .bind(input.notification_id)
            .bind(input.subscription_id)
            .bind(&input.callback_url)
            .bind(&input.auth)
            .bind(STATUS_PENDING)
            .bind(input.next_retry_at)
            .fetch_optional(pool)
            .await?;

        if let Some(attempt) = inserted {
            return Ok(attempt);
        }

        let existing = format!(
            "SELECT {COLUMNS} FROM delivery_attempts \
             WHERE notification_id = $1 AND subscription_id = $2"
        );
        sqlx::query_as::<_, DeliveryAttempt>(&existing)
            .bind(input.notification_id)
            .bind(input.subscription_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: EntityId,
    ) -> Result<Option<DeliveryAttempt>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM delivery_attempts WHERE id = $1");
        sqlx::query_as::<_, DeliveryAttempt>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_notification(
        pool: &PgPool,
        notification_id: EntityId,
    ) -> Result<Vec<DeliveryAttempt>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM delivery_attempts \
             WHERE notification_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, DeliveryAttempt>(&query)
            .bind(notification_id)
            .fetch_all(pool)
            .await
    }

    /// Move an attempt to `in_flight` and bump its counter.
    ///
    /// Claimable: any `pending` attempt, a `failed_retryable` attempt whose
    /// retry time has come, or an `in_flight` attempt whose lease expired.
    /// Returns `None` when someone else holds it or it is already settled.
    pub async fn claim(
        pool: &PgPool,
        id: EntityId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> Result<Option<DeliveryAttempt>, sqlx::Error> {
        let query = format!(
            "UPDATE delivery_attempts SET \
                 status = $4, \
                 attempt_count = attempt_count + 1, \
                 last_attempted_at = $2, \
                 next_retry_at = $3, \
                 updated_at = NOW() \
             WHERE id = $1 \
               AND (status = $5 \
                    OR (status IN ($6, $4) AND next_retry_at <= $2)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryAttempt>(&query)
            .bind(id)
            .bind(now)
            .bind(lease_until)
            .bind(STATUS_IN_FLIGHT)
            .bind(STATUS_PENDING)
            .bind(STATUS_FAILED_RETRYABLE)
            .fetch_optional(pool)
            .await
    }

    /// Write the outcome of a send. Only applies to attempts still
    /// `in_flight`; returns `None` otherwise.
    pub async fn update(
        pool: &PgPool,
        id: EntityId,
        update: &AttemptUpdate,
    ) -> Result<Option<DeliveryAttempt>, sqlx::Error> {
        let query = format!(
            "UPDATE delivery_attempts SET \
                 status = $2, \
                 last_status_code = $3, \
                 last_error = $4, \
                 next_retry_at = $5, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $6 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryAttempt>(&query)
            .bind(id)
            .bind(update.status.as_str())
            .bind(update.last_status_code)
            .bind(&update.last_error)
            .bind(update.next_retry_at)
            .bind(STATUS_IN_FLIGHT)
            .fetch_optional(pool)
            .await
    }

    /// Attempts the retry scan should pick up, oldest retry time first.
    pub async fn list_due(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DeliveryAttempt>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM delivery_attempts \
             WHERE status IN ($2, $3, $4) \
               AND next_retry_at <= $1 \
             ORDER BY next_retry_at ASC \
             LIMIT $5"
        );
        sqlx::query_as::<_, DeliveryAttempt>(&query)
            .bind(now)
            .bind(STATUS_PENDING)
            .bind(STATUS_IN_FLIGHT)
            .bind(STATUS_FAILED_RETRYABLE)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Reset a `failed_terminal` attempt to `pending` with a zero counter,
    /// due immediately. Returns `None` if the attempt is in any other state.
    pub async fn replay(
        pool: &PgPool,
        id: EntityId,
    ) -> Result<Option<DeliveryAttempt>, sqlx::Error> {
        let query = format!(
            "UPDATE delivery_attempts SET \
                 status = $2, \
                 attempt_count = 0, \
                 last_error = NULL, \
                 next_retry_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryAttempt>(&query)
            .bind(id)
            .bind(STATUS_PENDING)
            .bind(STATUS_FAILED_TERMINAL)
            .fetch_optional(pool)
            .await
    }
}
