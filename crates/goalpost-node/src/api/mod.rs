//! HTTP API.

pub mod goals;
pub mod health;
pub mod push;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use goalpost_core::GoalError;
use serde::Serialize;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// A [`GoalError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GoalError);

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            GoalError::StaleVersion { .. } => (StatusCode::CONFLICT, "stale_version"),
            GoalError::InvalidTransition { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition")
            }
            GoalError::GoalInvalid { .. } => (StatusCode::BAD_REQUEST, "invalid_goal"),
            GoalError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl From<GoalError> for ApiError {
    fn from(err: GoalError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: error.to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
