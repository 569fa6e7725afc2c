//! Repository for the `dispatch_jobs` queue table.

use nrc_core::types::Timestamp;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::dispatch_job::DispatchJobRow;

const COLUMNS: &str = "id, payload, claim_count, enqueued_at, lease_expires_at";

/// Durable at-least-once work queue backing the Postgres broker.
pub struct DispatchJobRepo;

impl DispatchJobRepo {
    /// Append a job and return its id.
    pub async fn enqueue(pool: &PgPool, payload: &serde_json::Value) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("INSERT INTO dispatch_jobs (payload) VALUES ($1) RETURNING id")
            .bind(payload)
            .fetch_one(pool)
            .await
    }

    /// Append a job inside an open transaction.
    pub async fn enqueue_in(
        tx: &mut Transaction<'_, Postgres>,
        payload: &serde_json::Value,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("INSERT INTO dispatch_jobs (payload) VALUES ($1) RETURNING id")
            .bind(payload)
            .fetch_one(&mut **tx)
            .await
    }

    /// Claim the oldest job that is not leased (or whose lease expired).
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent consumers never
    /// receive the same job while its lease is live.
    pub async fn claim(
        pool: &PgPool,
        lease_until: Timestamp,
    ) -> Result<Option<DispatchJobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE dispatch_jobs \
             SET claim_count = claim_count + 1, lease_expires_at = $1 \
             WHERE id = ( \
                 SELECT id FROM dispatch_jobs \
                 WHERE lease_expires_at IS NULL OR lease_expires_at <= NOW() \
                 ORDER BY id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DispatchJobRow>(&query)
            .bind(lease_until)
            .fetch_optional(pool)
            .await
    }

    /// Remove a finished job.
    pub async fn ack(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM dispatch_jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the lease so the job can be claimed again right away.
    pub async fn release(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE dispatch_jobs SET lease_expires_at = NULL WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Number of jobs still queued, leased or not.
    pub async fn depth(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dispatch_jobs")
            .fetch_one(pool)
            .await
    }
}
