//! Route definitions for the `/subscriptions` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::subscription;
use crate::state::AppState;

/// Routes mounted at `/subscriptions`.
///
/// ```text
/// GET    /        -> list
/// POST   /        -> create
/// GET    /{id}    -> get_by_id
/// PUT    /{id}    -> replace
/// PATCH  /{id}    -> patch
/// DELETE /{id}    -> delete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(subscription::list).post(subscription::create))
        .route(
            "/{id}",
            get(subscription::get_by_id)
                .put(subscription::replace)
                .patch(subscription::patch)
                .delete(subscription::delete),
        )
}
