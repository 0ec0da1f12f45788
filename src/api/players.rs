//! Player endpoints: leaderboard, votes and favorites

use axum::{
    Json,
    extract::{Path, Query, State},
};

use super::dto::{DataResponse, FavoriteRequest, FavoriteResponse, LimitParams, ListResponse, VoteRequest};
use crate::AppState;
use crate::data::Record;
use crate::error::AppError;
use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::service::{FavoritesService, VotingService};

const DEFAULT_LEADERBOARD_SIZE: usize = 30;

/// GET /api/players/leaderboard
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<ListResponse>, AppError> {
    let voting = VotingService::new(state.data.clone());
    let page = voting
        .leaderboard(params.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE))
        .await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/players/leaderboard", "200"])
        .inc();
    Ok(Json(page.into()))
}

/// POST /api/players/:id/vote
pub async fn vote(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<DataResponse<Record>>, AppError> {
    let voting = VotingService::new(state.data.clone());
    let player = voting.cast_vote(&player_id, &request.voter_id).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/players/:id/vote", "200"])
        .inc();
    Ok(Json(player.into()))
}

/// POST /api/players/:id/favorite
pub async fn favorite(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Json(request): Json<FavoriteRequest>,
) -> Result<Json<FavoriteResponse>, AppError> {
    let favorites = FavoritesService::new(state.data.clone());
    let liked = favorites.toggle(&request.user_id, &player_id).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/players/:id/favorite", "200"])
        .inc();
    Ok(Json(FavoriteResponse {
        degraded: liked.is_degraded(),
        liked: liked.into_inner(),
    }))
}

/// GET /api/users/:user_id/favorites
pub async fn user_favorites(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DataResponse<Vec<String>>>, AppError> {
    let favorites = FavoritesService::new(state.data.clone());
    let liked = favorites.liked_players(&user_id).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/users/:user_id/favorites", "200"])
        .inc();
    Ok(Json(liked.into()))
}
