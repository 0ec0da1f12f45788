//! Profile service

use serde_json::json;
use std::sync::Arc;

use crate::data::{Fetched, Fields, ListQuery, LocalStore, Record, RemoteBackend, TableAccessor, tables};
use crate::error::AppError;

/// User profiles, one `profiles` row per `user_id`
pub struct ProfileService<R, S> {
    data: Arc<TableAccessor<R, S>>,
}

impl<R: RemoteBackend, S: LocalStore> ProfileService<R, S> {
    pub fn new(data: Arc<TableAccessor<R, S>>) -> Self {
        Self { data }
    }

    pub async fn get(&self, user_id: &str) -> Fetched<Option<Record>> {
        self.data
            .list(
                tables::PROFILES,
                &ListQuery::new().eq("user_id", user_id).limit(1),
            )
            .await
            .map(|page| page.records.into_iter().next())
    }

    /// Update the user's profile, creating it on first save
    pub async fn upsert(&self, user_id: &str, mut fields: Fields) -> Result<Fetched<Record>, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }
        fields.insert("user_id".to_string(), json!(user_id));

        let existing = self.get(user_id).await;
        let lookup_degraded = existing.is_degraded();

        if let Some(profile) = existing.into_inner() {
            let updated = self.data.update(tables::PROFILES, &profile.id, fields).await?;
            let degraded = lookup_degraded || updated.is_degraded();
            let record = updated.into_inner().ok_or(AppError::NotFound)?;
            return Ok(Fetched::from_parts(record, degraded));
        }

        let created = self.data.create(tables::PROFILES, fields).await?;
        let degraded = lookup_degraded || created.is_degraded();
        Ok(Fetched::from_parts(created.into_inner(), degraded))
    }
}
