//! Voting service
//!
//! Ballots live in the `votes` table; each player row carries a
//! denormalized `votes` counter used for the leaderboard.

use serde_json::{Value, json};
use std::sync::Arc;

use crate::data::{
    Fetched, Fields, ListQuery, LocalStore, OrderBy, Page, Record, RemoteBackend, TableAccessor,
    tables,
};
use crate::error::AppError;

/// Voting service
pub struct VotingService<R, S> {
    data: Arc<TableAccessor<R, S>>,
}

impl<R: RemoteBackend, S: LocalStore> VotingService<R, S> {
    /// Create new voting service
    pub fn new(data: Arc<TableAccessor<R, S>>) -> Self {
        Self { data }
    }

    /// Players ranked by vote count, highest first
    pub async fn leaderboard(&self, limit: usize) -> Fetched<Page> {
        let query = ListQuery::new()
            .order_by(OrderBy::desc("votes"))
            .limit(limit);
        self.data.list(tables::PLAYERS, &query).await
    }

    /// Record one vote from `voter_id` for `player_id`
    ///
    /// A voter can vote for a given player once.
    ///
    /// # Returns
    /// The player with its incremented counter
    ///
    /// # Errors
    /// `NotFound` for an unknown player, `Validation` for a repeat vote.
    /// If the counter cannot be bumped the ballot is removed again, so the
    /// voter can retry.
    pub async fn cast_vote(&self, player_id: &str, voter_id: &str) -> Result<Fetched<Record>, AppError> {
        if voter_id.trim().is_empty() {
            return Err(AppError::Validation("voter_id is required".to_string()));
        }

        let player = self.data.get(tables::PLAYERS, player_id).await;
        let mut degraded = player.is_degraded();
        let player = player.into_inner().ok_or(AppError::NotFound)?;

        let existing = self
            .data
            .list(
                tables::VOTES,
                &ListQuery::new()
                    .eq("player_id", player_id)
                    .eq("voter_id", voter_id)
                    .limit(1),
            )
            .await;
        degraded |= existing.is_degraded();
        if !existing.value().records.is_empty() {
            return Err(AppError::Validation(format!(
                "{voter_id} has already voted for this player"
            )));
        }

        let mut ballot = Fields::new();
        ballot.insert("player_id".to_string(), json!(player_id));
        ballot.insert("voter_id".to_string(), json!(voter_id));
        let ballot = self.data.create(tables::VOTES, ballot).await?;
        degraded |= ballot.is_degraded();
        let ballot = ballot.into_inner();

        // The ballot only counts together with the counter bump.
        let current = player.get("votes").and_then(Value::as_i64).unwrap_or(0);
        let mut patch = Fields::new();
        patch.insert("votes".to_string(), json!(current + 1));
        let updated = match self.data.update(tables::PLAYERS, player_id, patch).await {
            Ok(updated) => updated,
            Err(error) => {
                self.withdraw_ballot(&ballot).await;
                return Err(error);
            }
        };
        degraded |= updated.is_degraded();

        let Some(updated) = updated.into_inner() else {
            self.withdraw_ballot(&ballot).await;
            return Err(AppError::NotFound);
        };
        tracing::info!(player_id = %player_id, votes = current + 1, degraded, "Vote recorded");
        Ok(Fetched::from_parts(updated, degraded))
    }

    async fn withdraw_ballot(&self, ballot: &Record) {
        if let Err(error) = self.data.remove(tables::VOTES, &ballot.id).await {
            tracing::error!(%error, ballot_id = %ballot.id, "Failed to withdraw ballot");
        }
    }
}
