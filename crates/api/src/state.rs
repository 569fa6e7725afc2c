use std::sync::Arc;

use nrc_core::permissions::{self, Action, Caller, CapabilityCheck};
use nrc_events::{NotificationStore, PublishPipeline, SubscriptionIndex};

use crate::config::ServerConfig;
use crate::error::AppResult;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Data-access backend (Postgres in production, in-memory in tests).
    pub store: Arc<dyn NotificationStore>,
    /// Subscription cache, kept in step with subscription writes.
    pub index: Arc<SubscriptionIndex>,
    /// Validates, records and enqueues published notifications.
    pub pipeline: PublishPipeline,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Authorization predicate evaluated before every operation.
    pub capabilities: CapabilityCheck,
}

impl AppState {
    /// Reject with 403 unless the capability predicate allows `action`.
    pub fn authorize(&self, caller: &Caller, action: Action) -> AppResult<()> {
        permissions::ensure_allowed(&self.capabilities, caller, action)?;
        Ok(())
    }
}
