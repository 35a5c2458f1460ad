//! API error types and handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tabula::TabulaError;
use tracing::warn;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown credentials.
    Unauthorized(String),
    /// Bad request from client.
    BadRequest(String),
    /// Error from the tabula library.
    Tabula(TabulaError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    /// Status code and machine-readable kind.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Tabula(e) => {
                let status = match e {
                    TabulaError::Authentication(_) => StatusCode::UNAUTHORIZED,
                    TabulaError::NotFound(_) => StatusCode::NOT_FOUND,
                    TabulaError::ConcurrentOperation
                    | TabulaError::Precondition(_)
                    | TabulaError::NoSnapshot => StatusCode::CONFLICT,
                    TabulaError::TransformExecution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    TabulaError::Connection(_)
                    | TabulaError::Classification(_)
                    | TabulaError::Generation(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.kind())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        let message = match self {
            ApiError::Unauthorized(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::Tabula(e) => e.to_string(),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error, %message, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<TabulaError> for ApiError {
    fn from(err: TabulaError) -> Self {
        ApiError::Tabula(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Tabula(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ApiError {}
