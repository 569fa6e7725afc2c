//! Subscriber callback delivery.
//!
//! [`WebhookDelivery`] makes exactly one HTTP POST per call; retries and
//! backoff are the dispatcher's business. The outcome is classified with
//! [`classify_status`] so the dispatcher only has to ask
//! [`DeliveryError::is_retryable`].

use std::time::Duration;

use nrc_core::retry::{classify_status, ResponseClass};
use nrc_core::types::EntityId;
use nrc_db::models::notification::Notification;
use reqwest::header::AUTHORIZATION;

/// Header carrying the notification id, for consumer-side deduplication.
pub const HEADER_NOTIFICATION_ID: &str = "X-NRC-Notification-Id";

/// Header carrying the subscription id the delivery is made for.
pub const HEADER_SUBSCRIPTION_ID: &str = "X-NRC-Subscription-Id";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A failed callback send.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Worth retrying: timeouts, connection failures, 5xx and 429.
    #[error("Transient delivery failure: {reason}")]
    Transient { status: Option<u16>, reason: String },

    /// Retrying will not help: other 4xx, unexpected statuses, or a
    /// request that cannot be built at all.
    #[error("Terminal delivery failure: {reason}")]
    Terminal { status: Option<u16>, reason: String },
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient { .. })
    }

    /// HTTP status returned by the callback, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Transient { status, .. } | DeliveryError::Terminal { status, .. } => {
                *status
            }
        }
    }

    fn from_request(err: reqwest::Error) -> Self {
        if err.is_builder() {
            DeliveryError::Terminal {
                status: None,
                reason: format!("invalid callback request: {err}"),
            }
        } else if err.is_timeout() {
            DeliveryError::Transient {
                status: None,
                reason: "callback timed out".to_string(),
            }
        } else {
            DeliveryError::Transient {
                status: None,
                reason: format!("request failed: {err}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers notification documents to subscriber callback URLs.
pub struct WebhookDelivery {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookDelivery {
    /// Build a client whose every request is cut off after `timeout`.
    ///
    /// Redirects are returned to the caller as-is; a 3xx is a terminal
    /// outcome, never a hop to another endpoint.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `notification` as JSON to `url`.
    ///
    /// Returns the 2xx status on success.
    pub async fn send(
        &self,
        url: &str,
        auth: Option<&str>,
        notification: &Notification,
        subscription_id: EntityId,
    ) -> Result<u16, DeliveryError> {
        let mut request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(HEADER_NOTIFICATION_ID, notification.id.to_string())
            .header(HEADER_SUBSCRIPTION_ID, subscription_id.to_string())
            .json(notification);
        if let Some(auth) = auth {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(DeliveryError::from_request)?;
        let status = response.status().as_u16();
        match classify_status(status) {
            ResponseClass::Success => Ok(status),
            ResponseClass::Retryable => Err(DeliveryError::Transient {
                status: Some(status),
                reason: format!("callback returned HTTP {status}"),
            }),
            ResponseClass::Terminal => Err(DeliveryError::Terminal {
                status: Some(status),
                reason: format!("callback returned HTTP {status}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
