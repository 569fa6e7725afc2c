//! Handlers for the `/deliveries` resource.

use axum::extract::{Path, State};
use axum::Json;
use nrc_core::error::CoreError;
use nrc_core::permissions::{ensure_owner, Action};
use nrc_core::types::EntityId;
use nrc_db::models::delivery_attempt::DeliveryAttempt;

use crate::error::AppResult;
use crate::middleware::auth::AuthClient;
use crate::state::AppState;

/// POST /api/v1/deliveries/{id}/replay
///
/// Reset a terminally failed attempt to `pending` with its counter at zero.
/// The retry scan sends it again on its next pass. Only the owner of the
/// subscription may replay; anything but `failed_terminal` is a 409.
pub async fn replay(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DeliveryAttempt>> {
    state.authorize(&caller, Action::DeliveryReplay)?;

    let attempt = state.store.get_delivery_attempt(id).await?;
    let subscription = state.store.get_subscription(attempt.subscription_id).await?;
    ensure_owner(&caller, &subscription.owner, "Subscription")?;

    let reset = state
        .store
        .reset_delivery_attempt(id)
        .await?
        .ok_or_else(|| {
            CoreError::Conflict(format!(
                "Delivery attempt is {}, only failed_terminal attempts can be replayed",
                attempt.status
            ))
        })?;

    tracing::info!(
        attempt_id = %id,
        notification_id = %reset.notification_id,
        subscription_id = %reset.subscription_id,
        "Delivery attempt replayed"
    );
    Ok(Json(reset))
}
