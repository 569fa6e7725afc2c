//! Handlers for the `/channels` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use nrc_core::permissions::{ensure_owner, Action};
use nrc_core::schema;
use nrc_core::types::EntityId;
use nrc_db::models::channel::{Channel, CreateChannel, UpdateChannel};
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::AuthClient;
use crate::query::ChannelListParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/channels
pub async fn list(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Query(params): Query<ChannelListParams>,
) -> AppResult<Json<DataResponse<Vec<Channel>>>> {
    state.authorize(&caller, Action::ChannelList)?;
    let page = params.page();
    let channels = state
        .store
        .list_channels(params.name.as_deref(), page.limit(), page.offset())
        .await?;
    Ok(Json(DataResponse { data: channels }))
}

/// GET /api/v1/channels/{id}
pub async fn get_by_id(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Channel>> {
    state.authorize(&caller, Action::ChannelRead)?;
    let channel = state.store.get_channel_by_id(id).await?;
    Ok(Json(channel))
}

/// POST /api/v1/channels
///
/// The caller becomes the channel owner.
pub async fn create(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Json(input): Json<CreateChannel>,
) -> AppResult<(StatusCode, Json<Channel>)> {
    state.authorize(&caller, Action::ChannelCreate)?;
    input.validate()?;
    schema::validate_channel_name(&input.name)?;
    schema::validate_filter_names(&input.filters)?;

    let channel = state
        .store
        .create_channel(input.into_new(&caller.client_id))
        .await?;

    tracing::info!(
        channel = %channel.name,
        owner = %channel.owner,
        filters = channel.filters.len(),
        "Channel created"
    );
    Ok((StatusCode::CREATED, Json(channel)))
}

/// PUT/PATCH /api/v1/channels/{id}
///
/// Only the owner may update. Declared filters may be extended, never
/// removed; the name is immutable.
pub async fn update(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(input): Json<UpdateChannel>,
) -> AppResult<Json<Channel>> {
    state.authorize(&caller, Action::ChannelUpdate)?;
    input.validate()?;

    let current = state.store.get_channel_by_id(id).await?;
    ensure_owner(&caller, &current.owner, "Channel")?;

    if let Some(filters) = &input.filters {
        schema::validate_filter_names(filters)?;
        schema::ensure_filters_extended(&current.filters, filters)?;
    }

    let channel = state.store.update_channel(id, input.into()).await?;
    Ok(Json(channel))
}

/// DELETE /api/v1/channels/{id}
///
/// 409 while subscriptions still reference the channel.
pub async fn delete(
    AuthClient(caller): AuthClient,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<StatusCode> {
    state.authorize(&caller, Action::ChannelDelete)?;

    let current = state.store.get_channel_by_id(id).await?;
    ensure_owner(&caller, &current.owner, "Channel")?;

    state.store.delete_channel(id).await?;
    state.index.invalidate(&current.name).await;

    tracing::info!(channel = %current.name, "Channel deleted");
    Ok(StatusCode::NO_CONTENT)
}
