//! Durable work queue decoupling publish from dispatch.
//!
//! Delivery is at-least-once: a claimed job carries a lease and is handed
//! out again if it is not acknowledged before the lease expires. The
//! dispatcher acknowledges a job only after the delivery attempts for its
//! notification are recorded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use nrc_core::types::EntityId;
use nrc_db::DbPool;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

mod memory;
mod pg;

pub use memory::MemoryBroker;
pub use pg::PgBroker;

/// Wire payload of a dispatch job: `{"notificationId": "<uuid>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub notification_id: EntityId,
}

/// A job handed out to one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub job: DispatchJob,
    /// Backend handle used to ack or release the job.
    pub receipt: i64,
    /// How many times this job has been handed out, this claim included.
    pub deliveries: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed dispatch job: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Unsupported broker URL: {0}")]
    UnsupportedUrl(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn enqueue(&self, job: DispatchJob) -> Result<(), BrokerError>;

    /// Take the next available job, if any, leasing it to the caller.
    async fn claim(&self) -> Result<Option<ClaimedJob>, BrokerError>;

    /// Remove a finished job for good.
    async fn ack(&self, claimed: &ClaimedJob) -> Result<(), BrokerError>;

    /// Give a job back for immediate redelivery.
    async fn release(&self, claimed: &ClaimedJob) -> Result<(), BrokerError>;

    /// Suspend until a job may be available, or at most `max`.
    async fn wait(&self, max: Duration) {
        tokio::time::sleep(max).await;
    }
}

/// Endless stream of claimed jobs.
///
/// Suspends while the queue is empty and keeps going after backend errors,
/// which are logged and retried after `poll`. Ends only when `cancel` fires.
pub fn consume(
    broker: Arc<dyn Broker>,
    poll: Duration,
    cancel: CancellationToken,
) -> BoxStream<'static, ClaimedJob> {
    stream::unfold((broker, cancel), move |(broker, cancel)| async move {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match broker.claim().await {
                Ok(Some(claimed)) => return Some((claimed, (broker, cancel))),
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = broker.wait(poll) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dispatch job claim failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(poll) => {}
                    }
                }
            }
        }
    })
    .boxed()
}

/// Open the broker named by `broker_url`.
///
/// - `memory://` gives a process-local queue.
/// - `postgres://` and `postgresql://` give the durable `dispatch_jobs` queue.
pub async fn connect(broker_url: &str, lease: Duration) -> Result<Arc<dyn Broker>, BrokerError> {
    if broker_url.starts_with("memory://") {
        return Ok(Arc::new(MemoryBroker::new(lease)));
    }
    if broker_url.starts_with("postgres://") || broker_url.starts_with("postgresql://") {
        let pool = nrc_db::create_pool(broker_url)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        return Ok(Arc::new(PgBroker::new(pool, lease)));
    }
    Err(BrokerError::UnsupportedUrl(broker_url.to_string()))
}

/// Open the configured broker, or the `dispatch_jobs` queue on the
/// notification database `pool` when no broker URL is set.
pub async fn open(
    broker_url: Option<&str>,
    pool: &DbPool,
    lease: Duration,
) -> Result<Arc<dyn Broker>, BrokerError> {
    match broker_url {
        None => Ok(Arc::new(PgBroker::new(pool.clone(), lease))),
        Some(url) => connect(url, lease).await,
    }
}
