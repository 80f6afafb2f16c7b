//! Push endpoint.

use axum::{extract::State, Json};
use goalpost_core::Push;
use goalpost_engine::CancellationResult;

use super::ApiError;
use crate::state::AppState;

/// Cancel the goals a push supersedes.
pub async fn on_push(
    State(state): State<AppState>,
    Json(push): Json<Push>,
) -> Result<Json<CancellationResult>, ApiError> {
    Ok(Json(state.engine.on_push(&push).await?))
}
