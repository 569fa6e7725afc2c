//! Escalation of repeated delivery failures.
//!
//! [`DeliveryAlerts`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and counts consecutive terminal failures per subscription. When a
//! subscription reaches the threshold, its endpoint is reported at error
//! level and the count starts over; a success resets it as well.
//!
//! Counters are only kept for subscriptions that failed recently, so
//! deleted or abandoned subscriptions do not pile up.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use nrc_core::types::EntityId;
use tokio::sync::broadcast;

use crate::bus::{DeliveryEvent, EVENT_DELIVERY_FAILED, EVENT_DELIVERY_SUCCEEDED};

/// Consecutive terminal failures before a subscription is reported.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Number of tracked subscriptions above which idle counters are pruned.
pub const MAX_TRACKED_SUBSCRIPTIONS: usize = 10_000;

/// A counter with no failure for this long is dropped when pruning.
const IDLE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy)]
struct FailureCount {
    consecutive: u32,
    last_failure: DateTime<Utc>,
}

/// A subscription whose endpoint keeps rejecting deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAlert {
    pub subscription_id: EntityId,
    pub callback_url: String,
    pub consecutive_failures: u32,
}

pub struct DeliveryAlerts {
    threshold: u32,
    capacity: usize,
    failures: HashMap<EntityId, FailureCount>,
}

impl DeliveryAlerts {
    pub fn new(threshold: u32) -> Self {
        Self::with_capacity(threshold, MAX_TRACKED_SUBSCRIPTIONS)
    }

    pub fn with_capacity(threshold: u32, capacity: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            capacity: capacity.max(1),
            failures: HashMap::new(),
        }
    }

    /// Number of subscriptions with a live failure counter.
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }

    /// Feed one event; returns an alert each time a subscription reaches
    /// the threshold.
    pub fn observe(&mut self, event: &DeliveryEvent) -> Option<EndpointAlert> {
        match event.event_type {
            EVENT_DELIVERY_SUCCEEDED => {
                self.failures.remove(&event.subscription_id);
                None
            }
            EVENT_DELIVERY_FAILED => {
                if !self.failures.contains_key(&event.subscription_id)
                    && self.failures.len() >= self.capacity
                {
                    self.prune(event.timestamp);
                }

                let count = self
                    .failures
                    .entry(event.subscription_id)
                    .or_insert(FailureCount {
                        consecutive: 0,
                        last_failure: event.timestamp,
                    });
                count.consecutive += 1;
                count.last_failure = event.timestamp;
                if count.consecutive < self.threshold {
                    return None;
                }

                let consecutive_failures = count.consecutive;
                self.failures.remove(&event.subscription_id);
                Some(EndpointAlert {
                    subscription_id: event.subscription_id,
                    callback_url: event.callback_url.clone(),
                    consecutive_failures,
                })
            }
            _ => None,
        }
    }

    /// Drop counters idle for a day. If every counter is recent, drop them
    /// all; a missed alert is preferable to unbounded growth.
    fn prune(&mut self, now: DateTime<Utc>) {
        let idle_since = now - Duration::hours(IDLE_AFTER_HOURS);
        self.failures.retain(|_, count| count.last_failure > idle_since);
        if self.failures.len() >= self.capacity {
            tracing::warn!(
                tracked = self.failures.len(),
                "Too many failing subscriptions tracked, resetting failure counters"
            );
            self.failures.clear();
        }
    }

    /// Run the alerting loop until the bus is dropped.
    pub async fn run(mut self, mut receiver: broadcast::Receiver<DeliveryEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(alert) = self.observe(&event) {
                        tracing::error!(
                            subscription_id = %alert.subscription_id,
                            callback_url = %alert.callback_url,
                            consecutive_failures = alert.consecutive_failures,
                            "Subscription endpoint keeps failing deliveries"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Delivery alerts lagged, some events were missed");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, delivery alerts shutting down");
                    break;
                }
            }
        }
    }
}

impl Default for DeliveryAlerts {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}
