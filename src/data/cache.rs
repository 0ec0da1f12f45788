//! Local cache of remote tables
//!
//! Each table is stored as one JSON array under a namespaced key
//! (`{prefix}{table}`). Only the accessor writes here; consumers see
//! records through accessor operations.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::local::LocalStore;
use super::models::Record;
use crate::error::AppError;
use crate::metrics::CACHE_WRITES_TOTAL;

/// Table cache over a [`LocalStore`]
pub struct LocalCache<S> {
    store: Arc<S>,
    key_prefix: String,
    /// Serializes read-modify-write cycles so concurrent writers don't
    /// overwrite each other's table snapshot
    write_lock: Mutex<()>,
}

impl<S: LocalStore> LocalCache<S> {
    /// Create new local cache
    ///
    /// # Arguments
    /// * `store` - Persistent key-value store
    /// * `key_prefix` - Namespace prepended to each table name
    pub fn new(store: Arc<S>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Cache key for a table
    pub fn key(&self, table: &str) -> String {
        format!("{}{}", self.key_prefix, table)
    }

    /// Load a table. A missing entry reads as empty.
    ///
    /// # Errors
    /// `LocalStorage` if the entry exists but does not parse. The entry is
    /// left in place; every `modify` on the table fails until it is
    /// replaced with `store` or dropped with `clear`.
    pub async fn load(&self, table: &str) -> Result<Vec<Record>, AppError> {
        let key = self.key(table);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(Vec::new());
        };

        serde_json::from_str::<Vec<Record>>(&raw).map_err(|error| {
            tracing::error!(%error, key = %key, "Unreadable cache entry");
            AppError::LocalStorage(format!("cache entry {key} is unreadable: {error}"))
        })
    }

    /// Replace a table
    pub async fn store(&self, table: &str, records: &[Record]) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.write(table, records).await
    }

    /// Insert or replace records by id, keeping the others
    pub async fn upsert(&self, table: &str, records: &[Record]) -> Result<(), AppError> {
        self.modify(table, |cached| {
            for record in records {
                match cached.iter_mut().find(|r| r.id == record.id) {
                    Some(existing) => *existing = record.clone(),
                    None => cached.push(record.clone()),
                }
            }
        })
        .await
    }

    /// Append one record
    pub async fn insert(&self, table: &str, record: Record) -> Result<(), AppError> {
        self.modify(table, |cached| cached.push(record)).await
    }

    /// Drop the record with `id`. Returns whether it was cached.
    pub async fn remove_id(&self, table: &str, id: &str) -> Result<bool, AppError> {
        let mut removed = false;
        self.modify(table, |cached| {
            let before = cached.len();
            cached.retain(|r| r.id != id);
            removed = cached.len() != before;
        })
        .await?;
        Ok(removed)
    }

    /// Run `f` over the cached table and persist the result atomically
    /// with respect to other writers of this cache.
    pub async fn modify<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Vec<Record>) -> T,
    ) -> Result<T, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load(table).await?;
        let result = f(&mut records);
        self.write(table, &records).await?;
        Ok(result)
    }

    /// Forget a table entirely
    pub async fn clear(&self, table: &str) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(&self.key(table)).await
    }

    async fn write(&self, table: &str, records: &[Record]) -> Result<(), AppError> {
        let raw = serde_json::to_string(records)?;
        self.store.set(&self.key(table), &raw).await?;
        CACHE_WRITES_TOTAL.with_label_values(&[table]).inc();
        Ok(())
    }
}
