//! Process-local broker for tests and `memory://` development mode.
//!
//! Jobs do not survive a restart.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{Broker, BrokerError, ClaimedJob, DispatchJob};

struct Entry {
    receipt: i64,
    job: DispatchJob,
    deliveries: u32,
    lease_expires: Option<Instant>,
}

#[derive(Default)]
struct Queue {
    next_receipt: i64,
    entries: VecDeque<Entry>,
}

pub struct MemoryBroker {
    queue: Mutex<Queue>,
    ready: Notify,
    lease: Duration,
    unavailable: AtomicBool,
}

impl MemoryBroker {
    pub fn new(lease: Duration) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            ready: Notify::new(),
            lease,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
        if !unavailable {
            self.ready.notify_one();
        }
    }

    /// Jobs not yet acknowledged, leased or not.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BrokerError::Unavailable("memory broker is offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, job: DispatchJob) -> Result<(), BrokerError> {
        self.check_available()?;
        let mut queue = self.queue.lock().await;
        queue.next_receipt += 1;
        let receipt = queue.next_receipt;
        queue.entries.push_back(Entry {
            receipt,
            job,
            deliveries: 0,
            lease_expires: None,
        });
        drop(queue);
        self.ready.notify_one();
        Ok(())
    }

    async fn claim(&self) -> Result<Option<ClaimedJob>, BrokerError> {
        self.check_available()?;
        let now = Instant::now();
        let mut queue = self.queue.lock().await;
        let Some(entry) = queue
            .entries
            .iter_mut()
            .find(|e| e.lease_expires.map_or(true, |until| until <= now))
        else {
            return Ok(None);
        };
        entry.deliveries += 1;
        entry.lease_expires = Some(now + self.lease);
        Ok(Some(ClaimedJob {
            job: entry.job,
            receipt: entry.receipt,
            deliveries: entry.deliveries,
        }))
    }

    async fn ack(&self, claimed: &ClaimedJob) -> Result<(), BrokerError> {
        self.check_available()?;
        let mut queue = self.queue.lock().await;
        queue.entries.retain(|e| e.receipt != claimed.receipt);
        Ok(())
    }

    async fn release(&self, claimed: &ClaimedJob) -> Result<(), BrokerError> {
        self.check_available()?;
        let mut queue = self.queue.lock().await;
        if let Some(entry) = queue
            .entries
            .iter_mut()
            .find(|e| e.receipt == claimed.receipt)
        {
            entry.lease_expires = None;
        }
        drop(queue);
        self.ready.notify_one();
        Ok(())
    }

    async fn wait(&self, max: Duration) {
        let _ = tokio::time::timeout(max, self.ready.notified()).await;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn job() -> DispatchJob {
        DispatchJob {
            notification_id: uuid::Uuid::now_v7(),
        }
    }

    #[tokio::test]
    async fn claimed_job_is_not_handed_out_twice() {
        let broker = MemoryBroker::new(Duration::from_secs(30));
        broker.enqueue(job()).await.unwrap();

        let claimed = broker.claim().await.unwrap().unwrap();
        assert_eq!(claimed.deliveries, 1);
        assert!(broker.claim().await.unwrap().is_none());

        broker.ack(&claimed).await.unwrap();
        assert!(broker.is_empty().await);
    }

    #[tokio::test]
    async fn expired_lease_redelivers() {
        let broker = MemoryBroker::new(Duration::ZERO);
        broker.enqueue(job()).await.unwrap();

        let first = broker.claim().await.unwrap().unwrap();
        let second = broker.claim().await.unwrap().unwrap();
        assert_eq!(first.receipt, second.receipt);
        assert_eq!(second.deliveries, 2);
    }

    #[tokio::test]
    async fn release_makes_job_available_again() {
        let broker = MemoryBroker::new(Duration::from_secs(30));
        broker.enqueue(job()).await.unwrap();
        let claimed = broker.claim().await.unwrap().unwrap();
        broker.release(&claimed).await.unwrap();
        assert!(broker.claim().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn offline_broker_rejects_enqueue() {
        let broker = MemoryBroker::new(Duration::from_secs(30));
        broker.set_unavailable(true);
        assert_matches!(broker.enqueue(job()).await, Err(BrokerError::Unavailable(_)));
        assert!(broker.is_empty().await);
    }
}
