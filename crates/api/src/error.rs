use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nrc_core::error::{CoreError, FieldError};
use nrc_events::{RoutingError, StoreError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`]; store, routing and validation errors convert into
/// it. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `nrc_core`.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Core(err.into())
    }
}

impl From<RoutingError> for AppError {
    fn from(err: RoutingError) -> Self {
        AppError::Core(err.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Core(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut invalid_params: Option<Vec<FieldError>> = None;

        let AppError::Core(core) = self;
        let (status, code, message) = match core {
            CoreError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} with id {id} not found"),
            ),
            CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            CoreError::InvalidParams(fields) => {
                invalid_params = Some(fields);
                (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    "Invalid input".to_string(),
                )
            }
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            CoreError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "Dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable, retry later".to_string(),
                )
            }
            CoreError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = match invalid_params {
            Some(fields) => json!({
                "error": message,
                "code": code,
                "invalid_params": fields,
            }),
            None => json!({
                "error": message,
                "code": code,
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}
