//! Remote table store
//!
//! `RemoteBackend` is the contract the accessor needs from a hosted
//! table store. `RestBackend` implements it over a PostgREST-style
//! HTTP API (the hosted backend the app was built against).

use futures::StreamExt;
use futures::stream::BoxStream;
use http::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::models::{ChangeEvent, Fields, ListQuery, Page, Record};
use crate::config::RemoteConfig;
use crate::error::AppError;

/// Stream of row-level change notifications for one table
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

/// Remote failure, split by whether the remote was reachable at all
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Could not reach the remote (connect, DNS, timeout, gateway errors)
    #[error("remote unreachable: {0}")]
    Transport(String),

    /// The remote understood the request and refused it
    #[error("remote rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The remote answered with something we could not parse
    #[error("unexpected remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Network-class failures are the only ones that flip the health flag
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected { status, message } => AppError::RemoteRejected { status, message },
            RemoteError::Decode(message) => AppError::Decode(message),
            RemoteError::Transport(message) => {
                AppError::Internal(anyhow::anyhow!("remote unreachable: {message}"))
            }
        }
    }
}

/// Table-scoped operations offered by the remote backend
pub trait RemoteBackend: Send + Sync + 'static {
    /// Query with exact-match filters, single-column order and row limit.
    /// `total_count` is the number of matching rows before the limit.
    fn query(
        &self,
        table: &str,
        query: &ListQuery,
    ) -> impl Future<Output = Result<Page, RemoteError>> + Send;

    /// Insert a partial record; the remote assigns `id` and timestamps
    fn insert(
        &self,
        table: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<Record, RemoteError>> + Send;

    /// Merge `fields` into the row with `id`. `None` if no such row.
    fn update(
        &self,
        table: &str,
        id: &str,
        fields: Fields,
    ) -> impl Future<Output = Result<Option<Record>, RemoteError>> + Send;

    /// Delete by id. Deleting a missing row succeeds.
    fn delete(&self, table: &str, id: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Open a push channel of row-level changes on `table`
    fn subscribe(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<ChangeStream, RemoteError>> + Send;

    /// Cheap reachability check
    fn ping(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

// =============================================================================
// REST backend
// =============================================================================

/// PostgREST-style HTTP backend
///
/// Every request carries the API key both as `apikey` header and as
/// bearer credential.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl RestBackend {
    /// Create new REST backend client
    ///
    /// # Arguments
    /// * `base_url` - Backend root, e.g. "https://xyz.supabase.co"
    /// * `api_key` - Bearer credential for this process
    /// * `timeout` - Per-request timeout (not applied to change streams)
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent("Ballondor/0.1.0")
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build from configuration; `None` when no remote is configured
    pub fn from_config(config: &RemoteConfig) -> Result<Option<Self>, AppError> {
        if !config.is_configured() {
            return Ok(None);
        }
        let url = config.url.clone().unwrap_or_default();
        let api_key = config.api_key.clone().unwrap_or_default();
        Self::new(url, api_key, config.timeout()).map(Some)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Send and split the outcome into transport / rejection / success
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(RemoteError::Transport(format!("HTTP {status}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: rejection_message(status, &body),
        })
    }

    async fn read_rows(response: reqwest::Response) -> Result<Vec<Record>, RemoteError> {
        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        serde_json::from_slice::<Vec<Record>>(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

impl RemoteBackend for RestBackend {
    async fn query(&self, table: &str, query: &ListQuery) -> Result<Page, RemoteError> {
        let mut params: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        for (field, value) in &query.filter {
            params.push((field.clone(), filter_expression(value)));
        }
        if let Some(order) = &query.order_by {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        let request = self
            .request(reqwest::Method::GET, &self.table_url(table))
            .query(&params)
            .header("Prefer", "count=exact")
            .timeout(self.timeout);
        let response = self.send(request).await?;

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let records = Self::read_rows(response).await?;
        let total_count = content_range
            .as_deref()
            .and_then(parse_content_range_total)
            .unwrap_or(records.len());

        Ok(Page {
            records,
            total_count,
        })
    }

    async fn insert(&self, table: &str, fields: Fields) -> Result<Record, RemoteError> {
        let request = self
            .request(reqwest::Method::POST, &self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&fields)
            .timeout(self.timeout);
        let response = self.send(request).await?;

        Self::read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("insert returned no rows".to_string()))
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Option<Record>, RemoteError> {
        let request = self
            .request(reqwest::Method::PATCH, &self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&fields)
            .timeout(self.timeout);
        let response = self.send(request).await?;

        Ok(Self::read_rows(response).await?.into_iter().next())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        let request = self
            .request(reqwest::Method::DELETE, &self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .timeout(self.timeout);
        self.send(request).await?;
        Ok(())
    }

    async fn subscribe(&self, table: &str) -> Result<ChangeStream, RemoteError> {
        let url = format!("{}/realtime/v1/{}", self.base_url, table);
        let request = self
            .request(reqwest::Method::GET, &url)
            .header("Accept", "text/event-stream");
        let response = self.send(request).await?;

        tracing::debug!(table = %table, "Change stream opened");
        Ok(sse_change_stream(table.to_string(), response))
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let url = format!("{}/rest/v1/", self.base_url);
        let request = self.request(reqwest::Method::GET, &url).timeout(self.timeout);
        match self.send(request).await {
            // Any non-gateway answer proves the remote is reachable.
            Ok(_) | Err(RemoteError::Rejected { .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> RemoteError {
    if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Transport(error.to_string())
    }
}

/// Prefer the backend's JSON `message`, fall back to the raw body or reason
fn rejection_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status.canonical_reason().unwrap_or("request rejected").to_string()
        } else {
            trimmed.to_string()
        }
    })
}

/// PostgREST filter operand for an exact match
fn filter_expression(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

/// `Content-Range: 0-14/30` -> 30. `*/0` -> 0. Unknown total (`0-14/*`) -> None.
fn parse_content_range_total(header: &str) -> Option<usize> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Largest event (pending line plus accumulated data) a change stream may buffer
const MAX_SSE_EVENT_BYTES: usize = 1024 * 1024;

/// Turn a `text/event-stream` body into change events.
///
/// Payloads that don't parse as a change event for `table` are skipped.
/// An event larger than [`MAX_SSE_EVENT_BYTES`] ends the stream.
fn sse_change_stream(table: String, response: reqwest::Response) -> ChangeStream {
    let bytes = Box::pin(response.bytes_stream());

    futures::stream::unfold(
        (bytes, SseDecoder::default(), table),
        |(mut bytes, mut decoder, table)| async move {
            loop {
                while let Some(payload) = decoder.next_payload() {
                    if let Some(event) = parse_change(&table, &payload) {
                        return Some((event, (bytes, decoder, table)));
                    }
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(error) = decoder.push(&chunk) {
                            tracing::warn!(%error, table = %table, "Change stream dropped");
                            return None;
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%error, table = %table, "Change stream interrupted");
                        return None;
                    }
                    None => {
                        tracing::debug!(table = %table, "Change stream closed by remote");
                        return None;
                    }
                }
            }
        },
    )
    .boxed()
}

/// Incremental `text/event-stream` decoder
///
/// Collects the `data:` lines of an event and yields them joined with
/// `\n` once a blank line dispatches the event. Other fields and
/// comments are ignored.
#[derive(Default)]
struct SseDecoder {
    pending: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Result<(), RemoteError> {
        self.pending.extend_from_slice(chunk);
        let buffered = self.pending.len() + self.data.as_ref().map_or(0, String::len);
        if buffered > MAX_SSE_EVENT_BYTES {
            return Err(RemoteError::Decode(format!(
                "event exceeds {MAX_SSE_EVENT_BYTES} bytes"
            )));
        }
        Ok(())
    }

    /// Next complete event payload from the bytes pushed so far
    fn next_payload(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(payload) = self.data.take() {
                    return Some(payload);
                }
                continue;
            }

            let value = match line.strip_prefix("data") {
                Some("") => "",
                Some(rest) => match rest.strip_prefix(':') {
                    Some(value) => value.strip_prefix(' ').unwrap_or(value),
                    None => continue,
                },
                None => continue,
            };
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        None
    }
}

fn parse_change(table: &str, payload: &str) -> Option<ChangeEvent> {
    if payload.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<ChangeEvent>(payload) {
        Ok(event) if event.table == table => Some(event),
        Ok(event) => {
            tracing::debug!(expected = %table, got = %event.table, "Ignoring change for other table");
            None
        }
        Err(error) => {
            tracing::debug!(%error, table = %table, "Ignoring malformed change event");
            None
        }
    }
}
