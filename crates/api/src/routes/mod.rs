pub mod channel;
pub mod delivery;
pub mod health;
pub mod notification;
pub mod subscription;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /channels                            list, create
/// /channels/{id}                       get, update (PUT/PATCH), delete
///
/// /subscriptions                       list, create
/// /subscriptions/{id}                  get, replace (PUT), patch, delete
///
/// /notifications                       publish (POST)
/// /notifications/{id}                  get
/// /notifications/{id}/deliveries       delivery attempts
///
/// /deliveries/{id}/replay              replay a failed attempt (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/channels", channel::router())
        .nest("/subscriptions", subscription::router())
        .nest("/notifications", notification::router())
        .nest("/deliveries", delivery::router())
}
