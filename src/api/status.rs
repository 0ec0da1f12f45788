//! Connectivity status endpoint

use axum::{Json, extract::State};

use super::dto::StatusResponse;
use crate::AppState;

/// GET /api/status
///
/// Lets the browser show an offline banner.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let health = state.data.health().status();
    Json(StatusResponse::new(state.data.is_remote_configured(), &health))
}
