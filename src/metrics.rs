//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ballondor_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Remote backend Metrics
    pub static ref REMOTE_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ballondor_remote_requests_total", "Total number of remote backend requests"),
        &["operation", "table", "outcome"]
    ).expect("metric can be created");
    pub static ref REMOTE_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "ballondor_remote_request_duration_seconds",
            "Remote backend request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    ).expect("metric can be created");
    pub static ref REMOTE_HEALTHY: IntGauge = IntGauge::new(
        "ballondor_remote_healthy",
        "1 when the remote backend is believed reachable, 0 when serving from the local cache"
    ).expect("metric can be created");
    pub static ref REMOTE_OFFLINE_SECONDS: IntGauge = IntGauge::new(
        "ballondor_remote_offline_seconds",
        "Seconds since the remote backend was marked unhealthy, 0 while healthy"
    ).expect("metric can be created");

    // Local cache Metrics
    pub static ref LOCAL_FALLBACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ballondor_local_fallbacks_total", "Operations served from the local cache"),
        &["operation", "table"]
    ).expect("metric can be created");
    pub static ref CACHE_WRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ballondor_cache_writes_total", "Local cache entry writes"),
        &["table"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ballondor_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .expect("HTTP_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(REMOTE_REQUESTS_TOTAL.clone()))
            .expect("REMOTE_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(REMOTE_REQUEST_DURATION_SECONDS.clone()))
            .expect("REMOTE_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(REMOTE_HEALTHY.clone()))
            .expect("REMOTE_HEALTHY can be registered");
        REGISTRY
            .register(Box::new(REMOTE_OFFLINE_SECONDS.clone()))
            .expect("REMOTE_OFFLINE_SECONDS can be registered");
        REGISTRY
            .register(Box::new(LOCAL_FALLBACKS_TOTAL.clone()))
            .expect("LOCAL_FALLBACKS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_WRITES_TOTAL.clone()))
            .expect("CACHE_WRITES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
