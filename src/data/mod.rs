//! Data layer module
//!
//! Table access with remote/local fallback:
//! - Remote table store (REST)
//! - Local cache (SQLite or memory)
//! - Remote health tracking
//! - Demo seed data

mod access;
mod cache;
mod health;
mod local;
mod models;
mod remote;
mod seed;

pub use access::{AccessorOptions, Subscription, TableAccessor};
pub use cache::LocalCache;
pub use health::{HealthState, HealthStatus, RemoteHealth};
pub use local::{CacheStore, LocalStore, MemoryStore, SqliteStore};
pub use models::*;
pub use remote::{ChangeStream, RemoteBackend, RemoteError, RestBackend};
pub use seed::{DEMO_VOTES_MAX, DEMO_VOTES_MIN, demo_players};

/// The accessor as wired by the application
pub type DataStore = TableAccessor<RestBackend, CacheStore>;
