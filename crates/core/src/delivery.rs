//! Delivery attempt status machine.
//!
//! ```text
//!            claim                 2xx
//! pending ----------> in_flight ---------> delivered
//!                      |   ^  \
//!          5xx/timeout |   |   \ 4xx or attempt cap
//!                      v   |    v
//!            failed_retryable   failed_terminal --(replay)--> pending
//! ```
//!
//! An expired `in_flight` lease may be re-claimed (`in_flight -> in_flight`)
//! so that a crashed dispatcher never strands an attempt. Applying a
//! terminal status to an attempt that already holds it is a no-op.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_FLIGHT: &str = "in_flight";
pub const STATUS_DELIVERED: &str = "delivered";
pub const STATUS_FAILED_RETRYABLE: &str = "failed_retryable";
pub const STATUS_FAILED_TERMINAL: &str = "failed_terminal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InFlight,
    Delivered,
    FailedRetryable,
    FailedTerminal,
}

/// Result of asking whether a status change may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The change is legal and must be written.
    Apply,
    /// The attempt already holds this terminal status; nothing to do.
    NoOp,
    /// The change is not allowed from the current status.
    Reject,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => STATUS_PENDING,
            DeliveryStatus::InFlight => STATUS_IN_FLIGHT,
            DeliveryStatus::Delivered => STATUS_DELIVERED,
            DeliveryStatus::FailedRetryable => STATUS_FAILED_RETRYABLE,
            DeliveryStatus::FailedTerminal => STATUS_FAILED_TERMINAL,
        }
    }

    /// Delivered and failed-terminal attempts are never sent again (short of
    /// an explicit replay).
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::FailedTerminal)
    }

    /// Classify a requested status change.
    pub fn transition_to(self, next: DeliveryStatus) -> Transition {
        use DeliveryStatus::*;

        match (self, next) {
            (Delivered, Delivered) | (FailedTerminal, FailedTerminal) => Transition::NoOp,
            (Pending, InFlight)
            | (FailedRetryable, InFlight)
            | (InFlight, InFlight)
            | (InFlight, Delivered)
            | (InFlight, FailedRetryable)
            | (InFlight, FailedTerminal)
            | (FailedTerminal, Pending) => Transition::Apply,
            _ => Transition::Reject,
        }
    }

    /// Shorthand for `transition_to(next) == Transition::Apply`.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        self.transition_to(next) == Transition::Apply
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATUS_PENDING => Ok(DeliveryStatus::Pending),
            STATUS_IN_FLIGHT => Ok(DeliveryStatus::InFlight),
            STATUS_DELIVERED => Ok(DeliveryStatus::Delivered),
            STATUS_FAILED_RETRYABLE => Ok(DeliveryStatus::FailedRetryable),
            STATUS_FAILED_TERMINAL => Ok(DeliveryStatus::FailedTerminal),
            other => Err(CoreError::Internal(format!(
                "Unknown delivery status '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for DeliveryStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
