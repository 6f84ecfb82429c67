//! Conversion of failures into JSON error responses
//!
//! Every handler returns [`ApiResult`]; whatever goes wrong ends up as a
//! `{"error": "..."}` body with a status picked from [`ParleyError`].

use crate::error::ParleyError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Handler error wrapping any `anyhow::Error`
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

/// Result type returned by handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Shorthand for a 400 with the given message
    pub fn validation(message: impl Into<String>) -> Self {
        Self(ParleyError::Validation(message.into()).into())
    }

    /// Shorthand for a 404 with the given message
    pub fn not_found(message: impl Into<String>) -> Self {
        Self(ParleyError::NotFound(message.into()).into())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self.0.downcast_ref::<ParleyError>() {
            Some(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if err.is_public() {
                    (status, err.to_string())
                } else {
                    tracing::error!("Request failed: {:#}", self.0);
                    (status, "Internal server error".to_string())
                }
            }
            None => {
                tracing::error!("Request failed: {:#}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_client_error() {
            tracing::debug!(status = %status, "Rejected request: {}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Unwrap a JSON body, turning extractor rejections into 400s
pub fn json_body(
    payload: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::validation(format!("Invalid JSON body: {}", rejection.body_text())))
}
