//! Handlers for the `/notifications` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use nrc_core::permissions::Action;
use nrc_core::types::EntityId;
use nrc_db::models::delivery_attempt::DeliveryAttempt;
use nrc_db::models::notification::{Notification, PublishNotification};

use crate::error::AppResult;
use crate::middleware::auth::AuthClient;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/notifications
///
/// Returns 201 with the stored document once the notification is recorded
/// and queued. Delivery outcomes never surface here.
pub async fn publish(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Json(input): Json<PublishNotification>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    state.authorize(&caller, Action::NotificationPublish)?;
    let notification = state.pipeline.publish(input).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /api/v1/notifications/{id}
pub async fn get_by_id(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Notification>> {
    state.authorize(&caller, Action::NotificationRead)?;
    let notification = state.store.get_notification(id).await?;
    Ok(Json(notification))
}

/// GET /api/v1/notifications/{id}/deliveries
///
/// Delivery attempts of one notification, oldest first.
pub async fn deliveries(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Vec<DeliveryAttempt>>>> {
    state.authorize(&caller, Action::NotificationRead)?;
    // 404 for unknown notifications rather than an empty list.
    state.store.get_notification(id).await?;
    let attempts = state.store.list_delivery_attempts(id).await?;
    Ok(Json(DataResponse { data: attempts }))
}
