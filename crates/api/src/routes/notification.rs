//! Route definitions for the `/notifications` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::notification;
use crate::state::AppState;

/// Routes mounted at `/notifications`.
///
/// ```text
/// POST   /                  -> publish
/// GET    /{id}              -> get_by_id
/// GET    /{id}/deliveries   -> deliveries
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(notification::publish))
        .route("/{id}", get(notification::get_by_id))
        .route("/{id}/deliveries", get(notification::deliveries))
}
