//! Ballon d'Or binary entry point

use ballondor::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize metrics
/// 4. Initialize AppState
/// 5. Build Axum router
/// 6. Start background remote-health probe
/// 7. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    tracing::info!("Starting Ballon d'Or data service...");
    tracing::info!(
        remote_configured = config.remote.is_configured(),
        timeout_ms = config.remote.timeout_ms,
        "Configuration loaded"
    );

    // 3. Initialize metrics
    ballondor::metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Build Axum router
    let app = ballondor::build_router(state.clone());

    // 6. Start background tasks
    if state.data.is_remote_configured() && config.remote.probe_interval_seconds > 0 {
        spawn_probe_task(state.clone());
    }

    // 7. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ballondor={},tower_http=debug", logging.level).into()
    });

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Spawn background remote-health probe
///
/// Lets the process come back online even when no call happens to land
/// after the retry window.
fn spawn_probe_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.remote.probe_interval_seconds;
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick; startup calls probe the remote anyway.
        interval.tick().await;

        loop {
            interval.tick().await;

            let was_healthy = state.data.health().is_healthy();
            match state.data.probe().await {
                Some(true) if !was_healthy => tracing::info!("Remote probe succeeded"),
                Some(false) => tracing::debug!("Remote probe failed; still serving local cache"),
                _ => {}
            }
        }
    });

    tracing::info!("Remote probe task spawned");
}
