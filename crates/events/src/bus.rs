//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! The dispatcher publishes a [`DeliveryEvent`] for every settled send.
//! The bus is shared via `Arc<EventBus>`; subscribers such as
//! [`DeliveryAlerts`](crate::alerts::DeliveryAlerts) each receive every
//! event independently.

use chrono::{DateTime, Utc};
use nrc_core::delivery::DeliveryStatus;
use nrc_core::types::EntityId;
use nrc_db::models::delivery_attempt::DeliveryAttempt;
use serde::Serialize;
use tokio::sync::broadcast;

pub const EVENT_DELIVERY_SUCCEEDED: &str = "delivery.succeeded";
pub const EVENT_DELIVERY_RETRY_SCHEDULED: &str = "delivery.retry_scheduled";
pub const EVENT_DELIVERY_FAILED: &str = "delivery.failed";

// ---------------------------------------------------------------------------
// DeliveryEvent
// ---------------------------------------------------------------------------

/// Outcome of one callback send.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryEvent {
    /// Dot-separated event name, e.g. `"delivery.failed"`.
    pub event_type: &'static str,
    pub attempt_id: EntityId,
    pub notification_id: EntityId,
    pub subscription_id: EntityId,
    pub callback_url: String,
    pub status: DeliveryStatus,
    pub attempt_count: i32,
    pub status_code: Option<i32>,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryEvent {
    /// Describe a settled attempt. Returns `None` for statuses that are not
    /// the outcome of a send (`pending`, `in_flight`).
    pub fn from_attempt(attempt: &DeliveryAttempt) -> Option<Self> {
        let event_type = match attempt.status {
            DeliveryStatus::Delivered => EVENT_DELIVERY_SUCCEEDED,
            DeliveryStatus::FailedRetryable => EVENT_DELIVERY_RETRY_SCHEDULED,
            DeliveryStatus::FailedTerminal => EVENT_DELIVERY_FAILED,
            DeliveryStatus::Pending | DeliveryStatus::InFlight => return None,
        };
        Some(Self {
            event_type,
            attempt_id: attempt.id,
            notification_id: attempt.notification_id,
            subscription_id: attempt.subscription_id,
            callback_url: attempt.callback_url.clone(),
            status: attempt.status,
            attempt_count: attempt.attempt_count,
            status_code: attempt.last_status_code,
            error: attempt.last_error.clone(),
            next_retry_at: attempt.next_retry_at,
            timestamp: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest un-consumed events are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<DeliveryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: DeliveryEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
