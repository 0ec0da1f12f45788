//! API request and response DTOs
//!
//! Every data-bearing response carries `degraded`, true when the result
//! came from the local cache instead of the remote backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Fetched, HealthStatus, Page, Record};

/// `GET /api/tables/:table`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub data: Vec<Record>,
    /// Matching rows before `limit` was applied
    pub count: usize,
    pub degraded: bool,
}

impl From<Fetched<Page>> for ListResponse {
    fn from(fetched: Fetched<Page>) -> Self {
        let degraded = fetched.is_degraded();
        let page = fetched.into_inner();
        Self {
            data: page.records,
            count: page.total_count,
            degraded,
        }
    }
}

/// Single payload plus where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
    pub degraded: bool,
}

impl<T> From<Fetched<T>> for DataResponse<T> {
    fn from(fetched: Fetched<T>) -> Self {
        let degraded = fetched.is_degraded();
        Self {
            data: fetched.into_inner(),
            degraded,
        }
    }
}

/// `DELETE /api/tables/:table/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedResponse {
    pub removed: bool,
    pub degraded: bool,
}

/// `POST /api/players/:id/favorite`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub liked: bool,
    pub degraded: bool,
}

/// `GET /api/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub remote_configured: bool,
    pub remote_healthy: bool,
    /// True whenever reads are served from the local cache
    pub offline: bool,
    pub unhealthy_since: Option<DateTime<Utc>>,
}

impl StatusResponse {
    pub fn new(remote_configured: bool, health: &HealthStatus) -> Self {
        let remote_healthy = health.is_healthy();
        Self {
            remote_configured,
            remote_healthy,
            offline: !remote_configured || !remote_healthy,
            unhealthy_since: health.unhealthy_since,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub voter_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub author_id: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}
