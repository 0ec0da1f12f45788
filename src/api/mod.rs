//! API layer
//!
//! HTTP handlers for:
//! - Generic table access (for the browser bundle)
//! - Votes, favorites, chat and profiles
//! - Connectivity status
//! - Metrics (Prometheus)

mod dto;
mod groups;
pub mod metrics;
mod players;
mod profiles;
mod status;
mod tables;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use dto::*;
pub use metrics::metrics_router;
pub use tables::parse_list_query;

/// Create the `/api` router
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::status))
        // Generic tables
        .route(
            "/tables/:table",
            get(tables::list_records).post(tables::create_record),
        )
        .route("/tables/:table/changes", get(tables::stream_changes))
        .route(
            "/tables/:table/:id",
            axum::routing::patch(tables::update_record).delete(tables::delete_record),
        )
        // Players
        .route("/players/leaderboard", get(players::leaderboard))
        .route("/players/:id/vote", post(players::vote))
        .route("/players/:id/favorite", post(players::favorite))
        .route("/users/:user_id/favorites", get(players::user_favorites))
        // Chat
        .route(
            "/groups/:id/messages",
            get(groups::recent_messages).post(groups::send_message),
        )
        .route("/groups/:id/messages/stream", get(groups::stream_messages))
        // Profiles
        .route(
            "/profiles/:user_id",
            get(profiles::get_profile).put(profiles::put_profile),
        )
}
