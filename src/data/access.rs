//! Dual-backend table accessor
//!
//! CRUD over named tables. Tries the remote first and falls back to
//! the local cache when the remote is unconfigured, marked unhealthy,
//! or fails at the transport level. Every successful remote call is
//! written through to the cache, so offline reads see the latest state
//! this process observed.
//!
//! Failure policy:
//! - transport failure: mark unhealthy, serve/mutate the cache, return `Degraded`
//! - remote rejection: return the error, cache untouched
//! - local storage failure: return the error (nothing below the cache)
//!
//! Records created offline keep their local ULID and are not pushed to
//! the remote once it comes back.

use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::cache::LocalCache;
use super::health::RemoteHealth;
use super::local::LocalStore;
use super::models::{
    ChangeEvent, ChangeKind, Fetched, Fields, ListQuery, Page, RESERVED_FIELDS, Record, tables,
    validate_table_name,
};
use super::remote::{RemoteBackend, RemoteError};
use super::seed::demo_players;
use crate::error::AppError;
use crate::metrics::{LOCAL_FALLBACKS_TOTAL, REMOTE_REQUEST_DURATION_SECONDS, REMOTE_REQUESTS_TOTAL};

/// Accessor tuning
#[derive(Debug, Clone)]
pub struct AccessorOptions {
    /// Upper bound on every remote call; expiry counts as a transport failure
    pub timeout: Duration,
    /// Whether `subscribe` opens remote change streams
    pub realtime: bool,
    /// Seed demo players into an empty cache when no remote is configured
    pub seed_demo_data: bool,
}

impl Default for AccessorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            realtime: true,
            seed_demo_data: true,
        }
    }
}

/// Table accessor over a remote backend `R` and a local store `S`
pub struct TableAccessor<R, S> {
    remote: Option<Arc<R>>,
    cache: Arc<LocalCache<S>>,
    health: Arc<RemoteHealth>,
    options: AccessorOptions,
}

impl<R: RemoteBackend, S: LocalStore> TableAccessor<R, S> {
    /// Create new accessor
    ///
    /// # Arguments
    /// * `remote` - Remote backend, `None` to run purely on the local cache
    /// * `cache` - Local cache (exclusively owned by this accessor)
    /// * `health` - Remote-health flag
    /// * `options` - Timeout, realtime and seeding options
    pub fn new(
        remote: Option<R>,
        cache: LocalCache<S>,
        health: Arc<RemoteHealth>,
        options: AccessorOptions,
    ) -> Self {
        Self {
            remote: remote.map(Arc::new),
            cache: Arc::new(cache),
            health,
            options,
        }
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn health(&self) -> &Arc<RemoteHealth> {
        &self.health
    }

    /// The remote to try for the next operation, if any
    fn active_remote(&self) -> Option<&Arc<R>> {
        self.remote
            .as_ref()
            .filter(|_| self.health.should_attempt())
    }

    /// Run one remote call under the timeout and update health + metrics
    async fn call<T>(
        &self,
        operation: &'static str,
        table: &str,
        request: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        let timer = REMOTE_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation])
            .start_timer();
        let result = match tokio::time::timeout(self.options.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Transport(format!(
                "timed out after {} ms",
                self.options.timeout.as_millis()
            ))),
        };
        timer.observe_duration();

        let outcome = match &result {
            Ok(_) => {
                self.health.mark_healthy();
                "ok"
            }
            Err(error) if error.is_transport() => {
                self.health.mark_unhealthy(&error.to_string());
                "transport"
            }
            Err(error) => {
                tracing::warn!(%error, table = %table, operation, "Remote rejected request");
                "rejected"
            }
        };
        REMOTE_REQUESTS_TOTAL
            .with_label_values(&[operation, table, outcome])
            .inc();

        result
    }

    fn note_fallback(&self, operation: &'static str, table: &str) {
        LOCAL_FALLBACKS_TOTAL
            .with_label_values(&[operation, table])
            .inc();
        tracing::debug!(table = %table, operation, "Serving from local cache");
    }

    /// Populate the demo players once, only when running without a remote
    async fn ensure_seeded(&self, table: &str) -> Result<(), AppError> {
        if self.remote.is_some() || !self.options.seed_demo_data || table != tables::PLAYERS {
            return Ok(());
        }
        if !self.cache.load(table).await?.is_empty() {
            return Ok(());
        }

        self.cache
            .modify(table, |records| {
                if records.is_empty() {
                    *records = demo_players();
                    tracing::info!(table = %table, count = records.len(), "Seeded demo data");
                }
            })
            .await
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// List records matching `query`
    ///
    /// Never fails: transport failures, rejections and local storage
    /// errors all resolve to a (possibly empty) page.
    pub async fn list(&self, table: &str, query: &ListQuery) -> Fetched<Page> {
        if let Err(error) = validate_table_name(table) {
            tracing::warn!(%error, "Refusing to list invalid table");
            return Fetched::Degraded(Page::default());
        }

        if let Some(remote) = self.active_remote() {
            match self.call("list", table, remote.query(table, query)).await {
                Ok(page) => {
                    // A partial view must not truncate the cached table.
                    let written = if query.is_full_scan() {
                        self.cache.store(table, &page.records).await
                    } else {
                        self.cache.upsert(table, &page.records).await
                    };
                    if let Err(error) = written {
                        tracing::error!(%error, table = %table, "Cache write-through failed");
                    }
                    return Fetched::Fresh(page);
                }
                // Reads don't surface rejections either; `call` has logged it.
                Err(_) => {}
            }
        }

        self.note_fallback("list", table);
        let records = match self.ensure_seeded(table).await {
            Ok(()) => self.cache.load(table).await,
            Err(error) => Err(error),
        };
        match records {
            Ok(records) => Fetched::Degraded(query.apply(records)),
            Err(error) => {
                tracing::error!(%error, table = %table, "Local cache read failed");
                Fetched::Degraded(Page::default())
            }
        }
    }

    /// Fetch one record by id
    pub async fn get(&self, table: &str, id: &str) -> Fetched<Option<Record>> {
        let query = ListQuery::new().eq("id", id).limit(1);
        self.list(table, &query)
            .await
            .map(|page| page.records.into_iter().next())
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Insert a record
    ///
    /// `fields` must not contain `id`. Lifecycle timestamps in `fields`
    /// are ignored.
    pub async fn create(&self, table: &str, mut fields: Fields) -> Result<Fetched<Record>, AppError> {
        validate_table_name(table)?;
        if fields.contains_key("id") {
            return Err(AppError::Validation(
                "id is assigned on creation and must not be provided".to_string(),
            ));
        }
        for reserved in RESERVED_FIELDS {
            fields.remove(reserved);
        }

        if let Some(remote) = self.active_remote() {
            match self
                .call("create", table, remote.insert(table, fields.clone()))
                .await
            {
                Ok(record) => {
                    self.cache
                        .upsert(table, std::slice::from_ref(&record))
                        .await
                        .inspect_err(|error| log_cache_error("create", table, error))?;
                    return Ok(Fetched::Fresh(record));
                }
                Err(error) if error.is_transport() => {}
                Err(error) => return Err(error.into()),
            }
        }

        self.note_fallback("create", table);
        self.ensure_seeded(table)
            .await
            .inspect_err(|error| log_cache_error("create", table, error))?;
        let record = Record::new_local(fields, Utc::now());
        self.cache
            .insert(table, record.clone())
            .await
            .inspect_err(|error| log_cache_error("create", table, error))?;

        Ok(Fetched::Degraded(record))
    }

    /// Merge `fields` into the record with `id`
    ///
    /// Returns `None` if no such record exists on the active path.
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        mut fields: Fields,
    ) -> Result<Fetched<Option<Record>>, AppError> {
        validate_table_name(table)?;
        if let Some(given) = fields.get("id") {
            if given != &Value::String(id.to_string()) {
                return Err(AppError::Validation("id cannot be changed".to_string()));
            }
        }
        for reserved in RESERVED_FIELDS {
            fields.remove(reserved);
        }

        if let Some(remote) = self.active_remote() {
            let mut patch = fields.clone();
            patch.insert(
                "updated_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );

            match self.call("update", table, remote.update(table, id, patch)).await {
                Ok(Some(record)) => {
                    self.cache
                        .upsert(table, std::slice::from_ref(&record))
                        .await
                        .inspect_err(|error| log_cache_error("update", table, error))?;
                    return Ok(Fetched::Fresh(Some(record)));
                }
                Ok(None) => {
                    // Gone remotely; don't keep serving it offline.
                    self.cache
                        .remove_id(table, id)
                        .await
                        .inspect_err(|error| log_cache_error("update", table, error))?;
                    return Ok(Fetched::Fresh(None));
                }
                Err(error) if error.is_transport() => {}
                Err(error) => return Err(error.into()),
            }
        }

        self.note_fallback("update", table);
        self.ensure_seeded(table)
            .await
            .inspect_err(|error| log_cache_error("update", table, error))?;
        let now = Utc::now();
        let updated = self
            .cache
            .modify(table, |records| {
                records.iter_mut().find(|r| r.id == id).map(|record| {
                    record.merge(fields, now);
                    record.clone()
                })
            })
            .await
            .inspect_err(|error| log_cache_error("update", table, error))?;

        Ok(Fetched::Degraded(updated))
    }

    /// Delete the record with `id`
    ///
    /// Idempotent: removing a missing record still reports `true`.
    pub async fn remove(&self, table: &str, id: &str) -> Result<Fetched<bool>, AppError> {
        validate_table_name(table)?;

        if let Some(remote) = self.active_remote() {
            match self.call("remove", table, remote.delete(table, id)).await {
                Ok(()) => {
                    self.cache
                        .remove_id(table, id)
                        .await
                        .inspect_err(|error| log_cache_error("remove", table, error))?;
                    return Ok(Fetched::Fresh(true));
                }
                Err(error) if error.is_transport() => {}
                Err(error) => return Err(error.into()),
            }
        }

        self.note_fallback("remove", table);
        self.ensure_seeded(table)
            .await
            .inspect_err(|error| log_cache_error("remove", table, error))?;
        let existed = self
            .cache
            .remove_id(table, id)
            .await
            .inspect_err(|error| log_cache_error("remove", table, error))?;
        if !existed {
            tracing::debug!(table = %table, id = %id, "Remove of missing record");
        }

        Ok(Fetched::Degraded(true))
    }

    // =========================================================================
    // Change notifications
    // =========================================================================

    /// Receive row-level changes on `table` pushed by the remote
    ///
    /// Changes are also written through to the local cache before
    /// `on_change` runs. Returns an inert subscription when the remote is
    /// unconfigured, realtime is disabled, or the stream cannot be opened:
    /// changes are never simulated for local-only mode.
    pub async fn subscribe<F>(&self, table: &str, on_change: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let Some(remote) = self.remote.as_ref().filter(|_| self.options.realtime) else {
            return Subscription::inert();
        };
        if let Err(error) = validate_table_name(table) {
            tracing::warn!(%error, "Refusing to subscribe to invalid table");
            return Subscription::inert();
        }

        let mut stream = match self.call("subscribe", table, remote.subscribe(table)).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(%error, table = %table, "Change subscription unavailable");
                return Subscription::inert();
            }
        };

        let cache = self.cache.clone();
        let health = self.health.clone();
        let table = table.to_string();
        let handle = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                health.mark_healthy();
                if let Err(error) = apply_change(&cache, &table, &event).await {
                    tracing::error!(%error, table = %table, "Failed to cache pushed change");
                }
                on_change(&event);
            }
            tracing::debug!(table = %table, "Change subscription ended");
        });

        Subscription {
            handle: Some(handle),
        }
    }

    /// Ping the remote and update the health flag.
    ///
    /// Returns `None` when no remote is configured.
    pub async fn probe(&self) -> Option<bool> {
        let remote = self.remote.as_ref()?;
        let _ = self.call("ping", "-", remote.ping()).await;
        Some(self.health.is_healthy())
    }
}

async fn apply_change<S: LocalStore>(
    cache: &LocalCache<S>,
    table: &str,
    event: &ChangeEvent,
) -> Result<(), AppError> {
    match (event.kind, &event.record) {
        (ChangeKind::Insert | ChangeKind::Update, Some(record)) => {
            cache.upsert(table, std::slice::from_ref(record)).await
        }
        (ChangeKind::Delete, _) => match event.record_id() {
            Some(id) => cache.remove_id(table, id).await.map(|_| ()),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn log_cache_error(operation: &str, table: &str, error: &AppError) {
    tracing::error!(%error, table = %table, operation, "Local cache operation failed");
}

/// Handle for a change subscription
///
/// Dropping it (or calling `unsubscribe`) stops delivery.
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// A subscription that never delivers anything
    pub fn inert() -> Self {
        Self { handle: None }
    }

    /// Whether change delivery is still running
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
