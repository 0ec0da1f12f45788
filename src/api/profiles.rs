//! Profile endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use super::dto::DataResponse;
use crate::AppState;
use crate::data::{Fields, Record};
use crate::error::AppError;
use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::service::ProfileService;

/// GET /api/profiles/:user_id
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DataResponse<Record>>, AppError> {
    let profiles = ProfileService::new(state.data.clone());
    let profile = profiles.get(&user_id).await;
    let degraded = profile.is_degraded();
    let record = profile.into_inner().ok_or(AppError::NotFound)?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/profiles/:user_id", "200"])
        .inc();
    Ok(Json(DataResponse {
        data: record,
        degraded,
    }))
}

/// PUT /api/profiles/:user_id
pub async fn put_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(fields): Json<Fields>,
) -> Result<Json<DataResponse<Record>>, AppError> {
    let profiles = ProfileService::new(state.data.clone());
    let profile = profiles.upsert(&user_id, fields).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["PUT", "/api/profiles/:user_id", "200"])
        .inc();
    Ok(Json(profile.into()))
}
