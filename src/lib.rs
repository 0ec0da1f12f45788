//! Ballon d'Or 2025 - data layer and HTTP surface for the voting app
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Generic table endpoints (list/create/update/delete/SSE)   │
//! │  - Voting, favorites, chat and profile endpoints             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Votes, favorites, chat messages, profiles                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Remote table store (REST, reqwest)                        │
//! │  - Local cache (SQLite via sqlx, or in-memory)               │
//! │  - Remote health flag                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Domain operations
//! - `data`: Table accessor with local fallback
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Table accessor (remote with local fallback)
    pub data: Arc<data::DataStore>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Open the local cache store
    /// 2. Build the remote client, if configured
    /// 3. Assemble the table accessor
    ///
    /// # Errors
    /// Returns error if the cache store cannot be opened or the remote
    /// client cannot be built
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Local cache
        let store = data::CacheStore::from_config(&config.cache).await?;
        let cache = data::LocalCache::new(Arc::new(store), config.cache.key_prefix.clone());
        tracing::info!(
            persistent = config.cache.path.is_some(),
            "Local cache initialized"
        );

        // 2. Remote backend
        let remote = data::RestBackend::from_config(&config.remote)?;
        match &config.remote.url {
            Some(url) if remote.is_some() => tracing::info!(url = %url, "Remote backend configured"),
            _ => tracing::warn!("Running without remote backend; all tables are local"),
        }

        // 3. Accessor
        let health = Arc::new(data::RemoteHealth::new(config.remote.retry_after()));
        let options = data::AccessorOptions {
            timeout: config.remote.timeout(),
            realtime: config.remote.realtime,
            seed_demo_data: config.seed.enabled,
        };
        let data = data::TableAccessor::new(remote, cache, health, options);

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            data: Arc::new(data),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .merge(api::metrics_router())
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if server.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::error!(%error, origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> &'static str {
    "OK"
}
