//! Local persistent key-value storage
//!
//! The last line of defence when the remote is unreachable.
//! `SqliteStore` persists across restarts; `MemoryStore` lives
//! for the process only.

use sqlx::{Pool, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use tokio::sync::RwLock;

use crate::error::AppError;

/// Key-value storage contract for the local cache
///
/// Values are opaque serialized strings. Implementors must be
/// `Send + Sync` so one store can back every table.
pub trait LocalStore: Send + Sync + 'static {
    /// Read a value, `None` if the key was never written or was removed
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Insert or replace a value
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite-backed store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the cache database at `path` and run migrations
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Local cache database opened");
        Ok(Self { pool })
    }
}

impl LocalStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM local_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO local_cache (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM local_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Memory
// =============================================================================

/// Process-local store (used when `cache.path` is unset, and in tests)
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// Configured store
// =============================================================================

/// The store selected by `cache.path`: SQLite when set, memory otherwise
pub enum CacheStore {
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

impl CacheStore {
    pub async fn from_config(config: &crate::config::CacheConfig) -> Result<Self, AppError> {
        match &config.path {
            Some(path) => Ok(Self::Sqlite(SqliteStore::open(path).await?)),
            None => {
                tracing::warn!("cache.path is not set; local cache will not survive restarts");
                Ok(Self::Memory(MemoryStore::new()))
            }
        }
    }
}

impl LocalStore for CacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match self {
            Self::Sqlite(store) => store.get(key).await,
            Self::Memory(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        match self {
            Self::Sqlite(store) => store.set(key, value).await,
            Self::Memory(store) => store.set(key, value).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        match self {
            Self::Sqlite(store) => store.remove(key).await,
            Self::Memory(store) => store.remove(key).await,
        }
    }
}
