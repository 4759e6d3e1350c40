//! Maps the error taxonomy onto HTTP responses.

use crate::dto::ErrorDto;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use model::DistillError;

/// Newtype so handlers can `?`-propagate both validation failures and
/// `anyhow::Error` from deeper layers without juggling two error types.
pub struct ApiError(DistillError);

impl From<DistillError> for ApiError {
    fn from(e: DistillError) -> Self {
        Self(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(DistillError::Internal(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorDto {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

/// Shorthand for building a `bad_request` error from a validation message.
pub fn bad_request(msg: impl Into<String>) -> ApiError {
    ApiError(DistillError::BadRequest(msg.into()))
}
