//! Handlers for the `/subscriptions` resource.
//!
//! Every write is mirrored into the [`SubscriptionIndex`](nrc_events::SubscriptionIndex)
//! so an embedded dispatcher sees it on its next match without waiting
//! for the staleness window.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use nrc_core::error::CoreError;
use nrc_core::permissions::{ensure_owner, Action};
use nrc_core::types::EntityId;
use nrc_db::models::subscription::{
    CreateSubscription, PatchSubscription, ReplaceSubscription, Subscription,
};
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::AuthClient;
use crate::query::SubscriptionListParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/subscriptions
pub async fn list(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Query(params): Query<SubscriptionListParams>,
) -> AppResult<Json<DataResponse<Vec<Subscription>>>> {
    state.authorize(&caller, Action::SubscriptionList)?;
    let page = params.page();
    let subscriptions = state
        .store
        .list_subscriptions(params.channel.as_deref(), page.limit(), page.offset())
        .await?;
    Ok(Json(DataResponse {
        data: subscriptions,
    }))
}

/// GET /api/v1/subscriptions/{id}
pub async fn get_by_id(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Subscription>> {
    state.authorize(&caller, Action::SubscriptionRead)?;
    let subscription = state.store.get_subscription(id).await?;
    Ok(Json(subscription))
}

/// POST /api/v1/subscriptions
///
/// Filter keys must be declared on the target channel.
pub async fn create(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Json(input): Json<CreateSubscription>,
) -> AppResult<(StatusCode, Json<Subscription>)> {
    state.authorize(&caller, Action::SubscriptionCreate)?;
    input.validate()?;
    state
        .pipeline
        .validate_subscription_filters(&input.channel, &input.filters)
        .await?;

    let subscription = state
        .store
        .create_subscription(input.into_new(&caller.client_id))
        .await?;
    state.index.add(subscription.clone()).await;

    tracing::info!(
        subscription_id = %subscription.id,
        channel = %subscription.channel,
        owner = %subscription.owner,
        "Subscription created"
    );
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// PUT /api/v1/subscriptions/{id}
///
/// Full replacement. The body must name the subscription's current
/// channel; a subscription cannot move between channels.
pub async fn replace(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(input): Json<ReplaceSubscription>,
) -> AppResult<Json<Subscription>> {
    state.authorize(&caller, Action::SubscriptionUpdate)?;
    input.validate()?;

    let current = state.store.get_subscription(id).await?;
    ensure_owner(&caller, &current.owner, "Subscription")?;
    if input.channel != current.channel {
        return Err(CoreError::Validation(format!(
            "Subscription channel cannot be changed from '{}'",
            current.channel
        ))
        .into());
    }
    state
        .pipeline
        .validate_subscription_filters(&current.channel, &input.filters)
        .await?;

    let subscription = state.store.update_subscription(id, input.into()).await?;
    state.index.update(subscription.clone()).await;
    Ok(Json(subscription))
}

/// PATCH /api/v1/subscriptions/{id}
pub async fn patch(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(input): Json<PatchSubscription>,
) -> AppResult<Json<Subscription>> {
    state.authorize(&caller, Action::SubscriptionUpdate)?;
    input.validate()?;

    let current = state.store.get_subscription(id).await?;
    ensure_owner(&caller, &current.owner, "Subscription")?;
    if let Some(filters) = &input.filters {
        state
            .pipeline
            .validate_subscription_filters(&current.channel, filters)
            .await?;
    }

    let subscription = state.store.update_subscription(id, input.into()).await?;
    state.index.update(subscription.clone()).await;
    Ok(Json(subscription))
}

/// DELETE /api/v1/subscriptions/{id}
///
/// Attempts already recorded for this subscription are still delivered.
pub async fn delete(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<StatusCode> {
    state.authorize(&caller, Action::SubscriptionDelete)?;

    let current = state.store.get_subscription(id).await?;
    ensure_owner(&caller, &current.owner, "Subscription")?;

    state.store.delete_subscription(id).await?;
    state.index.remove(id).await;

    tracing::info!(subscription_id = %id, channel = %current.channel, "Subscription deleted");
    Ok(StatusCode::NO_CONTENT)
}
