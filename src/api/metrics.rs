//! Prometheus scrape endpoint
//!
//! Health gauges are brought up to date on every scrape, so an outage
//! shows its duration even when no request has touched the remote since.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::data::HealthStatus;
use crate::metrics::{REGISTRY, REMOTE_HEALTHY, REMOTE_OFFLINE_SECONDS};

/// GET /metrics
async fn scrape(State(state): State<AppState>) -> Response {
    refresh_health_gauges(&state.data.health().status());

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(text) => ([(header::CONTENT_TYPE, encoder.format_type())], text).into_response(),
        Err(error) => {
            tracing::error!(%error, "Metrics exposition failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

fn refresh_health_gauges(status: &HealthStatus) {
    REMOTE_HEALTHY.set(i64::from(status.is_healthy()));
    REMOTE_OFFLINE_SECONDS.set(offline_seconds(status, Utc::now()));
}

fn offline_seconds(status: &HealthStatus, now: DateTime<Utc>) -> i64 {
    status
        .unhealthy_since
        .map(|since| (now - since).num_seconds().max(0))
        .unwrap_or(0)
}

/// `/metrics`, kept outside the traced and CORS-wrapped API routes
pub fn metrics_router() -> Router<AppState> {
    Router::new().route("/metrics", get(scrape))
}
