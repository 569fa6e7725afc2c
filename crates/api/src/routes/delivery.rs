use axum::routing::post;
use axum::Router;

use crate::handlers::delivery;
use crate::state::AppState;

/// Routes mounted at `/deliveries`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/replay", post(delivery::replay))
}
