//! Common test utilities for integration tests
//!
//! - `FakeRemote`: in-memory `RemoteBackend` with switchable failures
//! - `MockRest`: real HTTP server speaking the REST/realtime protocol
//! - `TestServer`: the application router on a random port

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use ballondor::config;
use ballondor::data::{
    AccessorOptions, ChangeEvent, ChangeKind, ChangeStream, Fields, ListQuery, LocalCache,
    LocalStore, MemoryStore, OrderBy, Page, Record, RemoteBackend, RemoteError, RemoteHealth,
    TableAccessor,
};
use ballondor::error::AppError;
use ballondor::AppState;
use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

// =============================================================================
// Fake remote
// =============================================================================

/// How the fake remote answers the next calls
#[derive(Debug, Clone, PartialEq)]
pub enum FailureMode {
    None,
    /// Network-class failure
    Transport,
    /// The remote answers but refuses
    Reject { status: u16, message: String },
    /// Never answers (exercises the accessor timeout)
    Hang,
}

#[derive(Default)]
struct FakeInner {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    mode: Mutex<Option<FailureMode>>,
    table_modes: Mutex<HashMap<String, FailureMode>>,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<ChangeEvent>)>>,
    calls: AtomicUsize,
}

/// In-memory remote backend
///
/// Cheap to clone; clones share tables and failure mode, so a test can
/// keep one handle while the accessor owns another.
#[derive(Clone, Default)]
pub struct FakeRemote {
    inner: Arc<FakeInner>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: FailureMode) {
        *self.inner.mode.lock().unwrap() = Some(mode);
    }

    /// Override the failure mode for calls on one table only
    pub fn set_table_mode(&self, table: &str, mode: FailureMode) {
        self.inner
            .table_modes
            .lock()
            .unwrap()
            .insert(table.to_string(), mode);
    }

    /// Number of calls that reached the fake, failed ones included
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Put a row straight into the remote table
    pub fn seed(&self, table: &str, record: Record) {
        self.inner
            .tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    /// Delete a row behind the accessor's back
    pub fn forget(&self, table: &str, id: &str) {
        if let Some(rows) = self.inner.tables.lock().unwrap().get_mut(table) {
            rows.retain(|r| r.id != id);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.inner
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Deliver a change to every open subscription on its table
    pub fn push(&self, event: ChangeEvent) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        subscribers.retain(|(table, tx)| table != &event.table || tx.send(event.clone()).is_ok());
    }

    /// Drop every open change stream
    pub fn close_streams(&self) {
        self.inner.subscribers.lock().unwrap().clear();
    }

    async fn enter(&self, table: &str) -> Result<(), RemoteError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let table_mode = self.inner.table_modes.lock().unwrap().get(table).cloned();
        let mode = table_mode
            .or_else(|| self.inner.mode.lock().unwrap().clone())
            .unwrap_or(FailureMode::None);
        match mode {
            FailureMode::None => Ok(()),
            FailureMode::Transport => Err(RemoteError::Transport("connection refused".to_string())),
            FailureMode::Reject { status, message } => Err(RemoteError::Rejected { status, message }),
            FailureMode::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

impl RemoteBackend for FakeRemote {
    async fn query(&self, table: &str, query: &ListQuery) -> Result<Page, RemoteError> {
        self.enter(table).await?;
        Ok(query.apply(self.rows(table)))
    }

    async fn insert(&self, table: &str, fields: Fields) -> Result<Record, RemoteError> {
        self.enter(table).await?;
        let record = Record::new_local(fields, Utc::now());
        self.seed(table, record.clone());
        Ok(record)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Option<Record>, RemoteError> {
        self.enter(table).await?;
        let mut tables = self.inner.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        Ok(rows.iter_mut().find(|r| r.id == id).map(|record| {
            record.merge(fields, Utc::now());
            record.clone()
        }))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.enter(table).await?;
        if let Some(rows) = self.inner.tables.lock().unwrap().get_mut(table) {
            rows.retain(|r| r.id != id);
        }
        Ok(())
    }

    async fn subscribe(&self, table: &str) -> Result<ChangeStream, RemoteError> {
        self.enter(table).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .push((table.to_string(), tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.enter("").await
    }
}

// =============================================================================
// Accessor builders
// =============================================================================

pub type TestAccessor = TableAccessor<FakeRemote, MemoryStore>;

pub fn test_options() -> AccessorOptions {
    AccessorOptions {
        timeout: Duration::from_millis(200),
        realtime: true,
        seed_demo_data: true,
    }
}

/// Accessor backed by `remote` (or nothing) and a fresh in-memory cache.
///
/// Returns the store too, so tests can inspect what was cached.
pub fn accessor_with(
    remote: Option<FakeRemote>,
    retry_after: Duration,
    options: AccessorOptions,
) -> (TestAccessor, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let cache = LocalCache::new(store.clone(), "ballondor_");
    let health = Arc::new(RemoteHealth::new(retry_after));
    (TableAccessor::new(remote, cache, health, options), store)
}

/// Remote-backed accessor that stays offline for the whole test once tripped
pub fn remote_accessor(remote: &FakeRemote) -> TestAccessor {
    accessor_with(Some(remote.clone()), Duration::from_secs(3600), test_options()).0
}

/// Local-only accessor
pub fn local_accessor() -> TestAccessor {
    accessor_with(None, Duration::from_secs(3600), test_options()).0
}

// =============================================================================
// Failing local store
// =============================================================================

/// In-memory store whose reads and writes can be switched to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), AppError> {
        if flag.load(Ordering::SeqCst) {
            return Err(AppError::LocalStorage("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl LocalStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        Self::check(&self.fail_writes)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        Self::check(&self.fail_writes)?;
        self.inner.remove(key).await
    }
}

/// Accessor over a [`FlakyStore`]; seeding is off so the store starts empty
pub fn flaky_accessor(
    remote: Option<FakeRemote>,
) -> (TableAccessor<FakeRemote, FlakyStore>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    let cache = LocalCache::new(store.clone(), "ballondor_");
    let health = Arc::new(RemoteHealth::new(Duration::from_secs(3600)));
    let mut options = test_options();
    options.seed_demo_data = false;
    (TableAccessor::new(remote, cache, health, options), store)
}

pub fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn record(id: &str, pairs: &[(&str, Value)]) -> Record {
    let now = Utc::now();
    Record {
        id: id.to_string(),
        created_at: now,
        updated_at: now,
        fields: fields(pairs),
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// =============================================================================
// Mock REST server
// =============================================================================

#[derive(Default)]
struct MockState {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    next_id: AtomicUsize,
    /// Status returned for every request instead of handling it
    forced_status: Mutex<Option<StatusCode>>,
    /// `apikey` / `Authorization` headers of the last request
    last_auth: Mutex<Option<(String, String)>>,
    streams: Mutex<Vec<(String, mpsc::UnboundedSender<ChangeEvent>)>>,
}

/// HTTP server impersonating the hosted REST backend on 127.0.0.1
#[derive(Clone)]
pub struct MockRest {
    pub url: String,
    state: Arc<MockState>,
}

type Shared = Arc<MockState>;

impl MockRest {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/rest/v1/", get(mock_root))
            .route(
                "/rest/v1/:table",
                get(mock_select)
                    .post(mock_insert)
                    .patch(mock_update)
                    .delete(mock_delete),
            )
            .route("/realtime/v1/:table", get(mock_realtime))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn seed(&self, table: &str, record: Record) {
        self.state
            .tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Answer every request with `status` until reset with `None`
    pub fn force_status(&self, status: Option<StatusCode>) {
        *self.state.forced_status.lock().unwrap() = status;
    }

    pub fn last_auth(&self) -> Option<(String, String)> {
        self.state.last_auth.lock().unwrap().clone()
    }

    pub fn stream_count(&self) -> usize {
        let mut streams = self.state.streams.lock().unwrap();
        streams.retain(|(_, tx)| !tx.is_closed());
        streams.len()
    }

    pub fn push(&self, event: ChangeEvent) {
        let streams = self.state.streams.lock().unwrap();
        for (table, tx) in streams.iter() {
            if table == &event.table {
                let _ = tx.send(event.clone());
            }
        }
    }
}

fn intercept(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    *state.last_auth.lock().unwrap() = Some((header("apikey"), header("authorization")));

    let forced = *state.forced_status.lock().unwrap();
    forced.map(|status| {
        (
            status,
            Json(serde_json::json!({ "message": format!("forced {}", status.as_u16()) })),
        )
            .into_response()
    })
}

/// PostgREST-style params -> list query; `id=eq.x` filters etc.
fn mock_query(params: &[(String, String)]) -> ListQuery {
    let mut query = ListQuery::new();
    for (key, value) in params {
        match key.as_str() {
            "select" => {}
            "order" => {
                if let Some((column, direction)) = value.rsplit_once('.') {
                    query = query.order_by(if direction == "desc" {
                        OrderBy::desc(column)
                    } else {
                        OrderBy::asc(column)
                    });
                }
            }
            "limit" => query = query.limit(value.parse().unwrap()),
            _ if value == "is.null" => query = query.eq(key.clone(), Value::Null),
            _ => {
                let operand = value.strip_prefix("eq.").unwrap_or(value);
                query = query.eq(key.clone(), operand.to_string());
            }
        }
    }
    query
}

async fn mock_root(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(response) = intercept(&state, &headers) {
        return response;
    }
    StatusCode::OK.into_response()
}

async fn mock_select(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = intercept(&state, &headers) {
        return response;
    }
    let rows = state
        .tables
        .lock()
        .unwrap()
        .get(&table)
        .cloned()
        .unwrap_or_default();
    let page = mock_query(&params).apply(rows);
    let range = if page.records.is_empty() {
        format!("*/{}", page.total_count)
    } else {
        format!("0-{}/{}", page.records.len() - 1, page.total_count)
    };
    ([("content-range", range)], Json(page.records)).into_response()
}

async fn mock_insert(
    State(state): State<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(fields): Json<Fields>,
) -> Response {
    if let Some(response) = intercept(&state, &headers) {
        return response;
    }
    let mut record = Record::new_local(fields, Utc::now());
    record.id = (state.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
    state
        .tables
        .lock()
        .unwrap()
        .entry(table)
        .or_default()
        .push(record.clone());
    (StatusCode::CREATED, Json(vec![record])).into_response()
}

async fn mock_update(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(fields): Json<Fields>,
) -> Response {
    if let Some(response) = intercept(&state, &headers) {
        return response;
    }
    let query = mock_query(&params);
    let mut tables = state.tables.lock().unwrap();
    let rows = tables.entry(table).or_default();
    let updated: Vec<Record> = rows
        .iter_mut()
        .filter(|r| query.matches(r))
        .map(|record| {
            record.merge(fields.clone(), Utc::now());
            record.clone()
        })
        .collect();
    Json(updated).into_response()
}

async fn mock_delete(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = intercept(&state, &headers) {
        return response;
    }
    let query = mock_query(&params);
    if let Some(rows) = state.tables.lock().unwrap().get_mut(&table) {
        rows.retain(|r| !query.matches(r));
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn mock_realtime(
    State(state): State<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = intercept(&state, &headers) {
        return response;
    }
    let (tx, rx) = mpsc::unbounded_channel::<ChangeEvent>();
    state.streams.lock().unwrap().push((table, tx));

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        Ok::<_, std::convert::Infallible>(
            Event::default()
                .event("change")
                .data(serde_json::to_string(&event).unwrap()),
        )
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

pub fn insert_event(table: &str, record: Record) -> ChangeEvent {
    ChangeEvent {
        table: table.to_string(),
        kind: ChangeKind::Insert,
        record: Some(record),
        old_id: None,
    }
}

pub fn delete_event(table: &str, id: &str) -> ChangeEvent {
    ChangeEvent {
        table: table.to_string(),
        kind: ChangeKind::Delete,
        record: None,
        old_id: Some(id.to_string()),
    }
}

// =============================================================================
// Application server
// =============================================================================

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Local-only server (no remote configured)
    pub async fn new() -> Self {
        Self::with_remote(None).await
    }

    /// Server whose remote is `remote_url`, with a SQLite cache in a temp dir
    pub async fn with_remote(remote_url: Option<String>) -> Self {
        ballondor::metrics::init_metrics();

        let temp_dir = TempDir::new().unwrap();
        let cache_path = temp_dir.path().join("cache.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                cors_origins: Vec::new(),
            },
            remote: config::RemoteConfig {
                api_key: remote_url.as_ref().map(|_| "test-anon-key".to_string()),
                url: remote_url,
                timeout_ms: 1000,
                retry_after_seconds: 3600,
                ..config::RemoteConfig::default()
            },
            cache: config::CacheConfig {
                path: Some(cache_path),
                key_prefix: "ballondor_".to_string(),
            },
            seed: config::SeedConfig { enabled: true },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::new(config).await.unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = ballondor::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}
