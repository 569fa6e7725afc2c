//! Route definitions for the `/channels` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::channel;
use crate::state::AppState;

/// Routes mounted at `/channels`.
///
/// ```text
/// GET    /        -> list
/// POST   /        -> create
/// GET    /{id}    -> get_by_id
/// PUT    /{id}    -> update
/// PATCH  /{id}    -> update
/// DELETE /{id}    -> delete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(channel::list).post(channel::create))
        .route(
            "/{id}",
            get(channel::get_by_id)
                .put(channel::update)
                .patch(channel::update)
                .delete(channel::delete),
        )
}
