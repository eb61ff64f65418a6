//! Maps service errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use grove_core::GroveError;

/// Handler error: every failure is rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(pub GroveError);

impl From<GroveError> for ApiError {
    fn from(err: GroveError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &GroveError) -> StatusCode {
    match err {
        GroveError::Validation(_)
        | GroveError::IntegrationInactive
        | GroveError::NotConnected
        | GroveError::RefreshExpired
        | GroveError::UnknownProvider(_) => StatusCode::BAD_REQUEST,
        GroveError::InvalidWebhookToken => StatusCode::UNAUTHORIZED,
        GroveError::UnknownUser(_) => StatusCode::NOT_FOUND,
        GroveError::RefreshFailed(_)
        | GroveError::OAuth(_)
        | GroveError::Provider(_)
        | GroveError::Model(_) => StatusCode::BAD_GATEWAY,
        GroveError::Cipher(_) | GroveError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::warn!("request rejected: {}", self.0);
        }

        let body = serde_json::json!({
            "error": self.0.to_string()
        });

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
