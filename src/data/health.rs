//! Remote health tracking
//!
//! Remembers whether the remote backend answered the last
//! reachability-sensitive call, so the accessor can skip doomed
//! network calls and go straight to the local cache.

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::metrics::REMOTE_HEALTHY;

/// Health state of the remote backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug)]
struct Inner {
    state: HealthState,
    /// Monotonic instant of the last Healthy -> Unhealthy transition
    unhealthy_at: Option<Instant>,
    /// Wall-clock time of the same transition, for reporting
    unhealthy_since: Option<DateTime<Utc>>,
}

/// Snapshot for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub state: HealthState,
    pub unhealthy_since: Option<DateTime<Utc>>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }
}

/// Remote-health flag
///
/// Starts optimistic (`Healthy`). Only transport-level failures flip it
/// to `Unhealthy`; any successful remote call flips it back.
/// Owned by one accessor and shared with its background probe through `Arc`.
#[derive(Debug)]
pub struct RemoteHealth {
    inner: RwLock<Inner>,
    /// How long an unhealthy flag suppresses remote attempts
    retry_after: Duration,
}

impl RemoteHealth {
    /// Create a tracker in the `Healthy` state
    ///
    /// # Arguments
    /// * `retry_after` - After this long in `Unhealthy`, the next call is
    ///   allowed to try the remote again. `Duration::ZERO` disables this.
    pub fn new(retry_after: Duration) -> Self {
        REMOTE_HEALTHY.set(1);
        Self {
            inner: RwLock::new(Inner {
                state: HealthState::Healthy,
                unhealthy_at: None,
                unhealthy_since: None,
            }),
            retry_after,
        }
    }

    pub fn state(&self) -> HealthState {
        self.read().state
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == HealthState::Healthy
    }

    pub fn status(&self) -> HealthStatus {
        let inner = self.read();
        HealthStatus {
            state: inner.state,
            unhealthy_since: inner.unhealthy_since,
        }
    }

    /// Whether the next operation should try the remote
    pub fn should_attempt(&self) -> bool {
        let inner = self.read();
        match inner.state {
            HealthState::Healthy => true,
            HealthState::Unhealthy => {
                !self.retry_after.is_zero()
                    && inner
                        .unhealthy_at
                        .is_some_and(|at| at.elapsed() >= self.retry_after)
            }
        }
    }

    /// Record a successful remote call
    pub fn mark_healthy(&self) {
        let mut inner = self.write();
        if inner.state == HealthState::Unhealthy {
            tracing::info!(
                since = ?inner.unhealthy_since,
                "Remote backend reachable again; leaving offline mode"
            );
        }
        inner.state = HealthState::Healthy;
        inner.unhealthy_at = None;
        inner.unhealthy_since = None;
        REMOTE_HEALTHY.set(1);
    }

    /// Record a transport-level failure
    pub fn mark_unhealthy(&self, reason: &str) {
        let mut inner = self.write();
        match inner.state {
            HealthState::Healthy => {
                tracing::warn!(reason = %reason, "Remote backend unreachable; using local cache");
                inner.unhealthy_since = Some(Utc::now());
            }
            HealthState::Unhealthy => {
                tracing::debug!(reason = %reason, "Remote backend still unreachable");
            }
        }
        // A failed re-probe restarts the back-off window.
        inner.state = HealthState::Unhealthy;
        inner.unhealthy_at = Some(Instant::now());
        REMOTE_HEALTHY.set(0);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RemoteHealth {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
