//! Postgres broker over the `dispatch_jobs` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nrc_db::repositories::DispatchJobRepo;
use nrc_db::DbPool;

use super::{Broker, BrokerError, ClaimedJob, DispatchJob};

/// Durable broker. Jobs survive restarts; concurrent consumers in any
/// number of processes share the queue through `SKIP LOCKED` claims.
#[derive(Clone)]
pub struct PgBroker {
    pool: DbPool,
    lease: Duration,
}

impl PgBroker {
    pub fn new(pool: DbPool, lease: Duration) -> Self {
        Self { pool, lease }
    }
}

fn unavailable(err: sqlx::Error) -> BrokerError {
    BrokerError::Unavailable(err.to_string())
}

#[async_trait]
impl Broker for PgBroker {
    async fn enqueue(&self, job: DispatchJob) -> Result<(), BrokerError> {
        let payload = serde_json::to_value(job)?;
        let id = DispatchJobRepo::enqueue(&self.pool, &payload)
            .await
            .map_err(unavailable)?;
        tracing::debug!(job_id = id, notification_id = %job.notification_id, "Dispatch job enqueued");
        Ok(())
    }

    async fn claim(&self) -> Result<Option<ClaimedJob>, BrokerError> {
        let lease = chrono::Duration::from_std(self.lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let Some(row) = DispatchJobRepo::claim(&self.pool, Utc::now() + lease)
            .await
            .map_err(unavailable)?
        else {
            return Ok(None);
        };

        match serde_json::from_value::<DispatchJob>(row.payload) {
            Ok(job) => Ok(Some(ClaimedJob {
                job,
                receipt: row.id,
                deliveries: u32::try_from(row.claim_count).unwrap_or(u32::MAX),
            })),
            Err(e) => {
                // A payload that cannot be decoded will never succeed; drop it.
                tracing::error!(job_id = row.id, error = %e, "Discarding malformed dispatch job");
                DispatchJobRepo::ack(&self.pool, row.id)
                    .await
                    .map_err(unavailable)?;
                Err(BrokerError::Codec(e))
            }
        }
    }

    async fn ack(&self, claimed: &ClaimedJob) -> Result<(), BrokerError> {
        DispatchJobRepo::ack(&self.pool, claimed.receipt)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn release(&self, claimed: &ClaimedJob) -> Result<(), BrokerError> {
        DispatchJobRepo::release(&self.pool, claimed.receipt)
            .await
            .map_err(unavailable)
    }
}
