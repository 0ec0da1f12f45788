//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub seed: SeedConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Origins allowed to call the API from a browser. Any origin when empty.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Remote table store configuration
///
/// The remote is considered configured only when `url` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the hosted backend (e.g. "https://xyz.supabase.co")
    pub url: Option<String>,
    /// API key presented as bearer credential on every request
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
    /// How long to stay offline before letting a call re-probe the remote.
    ///
    /// Set to 0 to only recover through the background probe.
    #[serde(default = "default_retry_after_seconds")]
    pub retry_after_seconds: u64,
    /// Open change-notification streams when callers subscribe
    #[serde(default = "default_true")]
    pub realtime: bool,
    /// Background health probe interval in seconds (0 disables the probe)
    #[serde(default = "default_probe_interval_seconds")]
    pub probe_interval_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_ms: default_remote_timeout_ms(),
            retry_after_seconds: default_retry_after_seconds(),
            realtime: true,
            probe_interval_seconds: default_probe_interval_seconds(),
        }
    }
}

impl RemoteConfig {
    /// Whether a remote backend should be used at all
    pub fn is_configured(&self) -> bool {
        self.url
            .as_deref()
            .map(str::trim)
            .is_some_and(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_seconds)
    }
}

fn default_remote_timeout_ms() -> u64 {
    8_000
}

fn default_retry_after_seconds() -> u64 {
    30
}

fn default_probe_interval_seconds() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Local cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// SQLite file backing the local cache. In-memory when unset.
    pub path: Option<PathBuf>,
    /// Prefix prepended to table names to build cache keys
    pub key_prefix: String,
}

/// Demo data configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Seed demo players into an empty cache when running without a remote
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (BALLONDOR__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("remote.timeout_ms", 8000)?
            .set_default("remote.retry_after_seconds", 30)?
            .set_default("remote.realtime", true)?
            .set_default("remote.probe_interval_seconds", 60)?
            .set_default("cache.key_prefix", "ballondor_")?
            .set_default("seed.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("BALLONDOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.remote.timeout_ms == 0 {
            return Err(crate::error::AppError::Config(
                "remote.timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.cache.key_prefix.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "cache.key_prefix must not be empty".to_string(),
            ));
        }

        if !self.remote.is_configured() {
            tracing::warn!("remote.url is not set; serving all tables from the local cache");
            return Ok(());
        }

        let raw_url = self.remote.url.as_deref().unwrap_or_default().trim();
        let parsed = url::Url::parse(raw_url).map_err(|e| {
            crate::error::AppError::Config(format!("remote.url is not a valid URL: {e}"))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(crate::error::AppError::Config(
                "remote.url must use http or https".to_string(),
            ));
        }

        let has_key = self
            .remote
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if !has_key {
            return Err(crate::error::AppError::Config(
                "remote.api_key is required when remote.url is set".to_string(),
            ));
        }

        Ok(())
    }
}
