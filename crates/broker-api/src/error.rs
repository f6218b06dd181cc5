use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors surfaced by the HTTP layer. Maps onto the lookup-error and
/// notification-error categories of the dispatch specification's error
/// taxonomy; scheduling errors never reach here, they are persisted onto
/// the job itself by the dispatch loop.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<broker_store::StoreError> for ApiError {
    fn from(e: broker_store::StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<broker_objectstore::ObjectStoreError> for ApiError {
    fn from(e: broker_objectstore::ObjectStoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
