use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use testpool_store::StoreError;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::FORBIDDEN, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<testpool_engine::EngineError> for ApiError {
    fn from(e: testpool_engine::EngineError) -> Self {
        match e {
            testpool_engine::EngineError::Store(s) => s.into(),
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// `acquire`/`release` fail with 403 (no ready resource, or not reserved) per
/// the HTTP surface's contract; everything else not found maps to 404, and
/// anything else is an internal error.
impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoResources(_) | StoreError::NotReserved(_) => ApiError::forbidden(e.to_string()),
            StoreError::UnknownPool(_) | StoreError::UnknownResource(_) | StoreError::UnknownHost(_) => {
                ApiError::not_found(e.to_string())
            }
            StoreError::PoolAlreadyExists(_) | StoreError::HostAlreadyExists { .. } => {
                ApiError::bad_request(e.to_string())
            }
            StoreError::Serialization(_) | StoreError::Internal(_) => ApiError::internal(e.to_string()),
        }
    }
}
