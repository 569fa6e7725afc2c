//! Dispatch queue rows.

use nrc_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `dispatch_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct DispatchJobRow {
    pub id: i64,
    pub payload: serde_json::Value,
    pub claim_count: i32,
    pub enqueued_at: Timestamp,
    pub lease_expires_at: Option<Timestamp>,
}
