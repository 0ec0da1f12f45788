//! Favorites service

use serde_json::json;
use std::sync::Arc;

use crate::data::{Fetched, Fields, ListQuery, LocalStore, RemoteBackend, TableAccessor, tables};
use crate::error::AppError;

/// Likes on players, one `favorites` row per (user, player)
pub struct FavoritesService<R, S> {
    data: Arc<TableAccessor<R, S>>,
}

impl<R: RemoteBackend, S: LocalStore> FavoritesService<R, S> {
    pub fn new(data: Arc<TableAccessor<R, S>>) -> Self {
        Self { data }
    }

    /// Like the player if not liked yet, otherwise unlike.
    ///
    /// Returns the new liked state.
    pub async fn toggle(&self, user_id: &str, player_id: &str) -> Result<Fetched<bool>, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }

        let existing = self
            .data
            .list(
                tables::FAVORITES,
                &ListQuery::new()
                    .eq("user_id", user_id)
                    .eq("player_id", player_id),
            )
            .await;
        let mut degraded = existing.is_degraded();
        let existing = existing.into_inner().records;

        if existing.is_empty() {
            let mut fields = Fields::new();
            fields.insert("user_id".to_string(), json!(user_id));
            fields.insert("player_id".to_string(), json!(player_id));
            degraded |= self.data.create(tables::FAVORITES, fields).await?.is_degraded();
            return Ok(Fetched::from_parts(true, degraded));
        }

        // Duplicates can appear when the same like was made online and offline.
        for favorite in existing {
            degraded |= self
                .data
                .remove(tables::FAVORITES, &favorite.id)
                .await?
                .is_degraded();
        }
        Ok(Fetched::from_parts(false, degraded))
    }

    /// Ids of the players `user_id` likes
    pub async fn liked_players(&self, user_id: &str) -> Fetched<Vec<String>> {
        self.data
            .list(tables::FAVORITES, &ListQuery::new().eq("user_id", user_id))
            .await
            .map(|page| {
                page.records
                    .iter()
                    .filter_map(|r| r.get("player_id").and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .collect()
            })
    }
}
