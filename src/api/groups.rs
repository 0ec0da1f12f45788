//! Group chat endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::dto::{DataResponse, LimitParams, SendMessageRequest};
use crate::AppState;
use crate::data::Record;
use crate::error::AppError;
use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::service::ChatService;

const DEFAULT_HISTORY: usize = 50;
const MAX_HISTORY: usize = 200;

/// GET /api/groups/:id/messages
pub async fn recent_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<DataResponse<Vec<Record>>>, AppError> {
    let chat = ChatService::new(state.data.clone());
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY).min(MAX_HISTORY);
    let messages = chat.recent(&group_id, limit).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/groups/:id/messages", "200"])
        .inc();
    Ok(Json(messages.into()))
}

/// POST /api/groups/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<DataResponse<Record>>), AppError> {
    let chat = ChatService::new(state.data.clone());
    let message = chat
        .send(&group_id, &request.author_id, &request.body)
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/groups/:id/messages", "201"])
        .inc();
    Ok((StatusCode::CREATED, Json(message.into())))
}

/// GET /api/groups/:id/messages/stream
///
/// New messages of one group as server-sent `message` events.
pub async fn stream_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let chat = ChatService::new(state.data.clone());

    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = chat
        .watch(&group_id, move |record| {
            let _ = tx.send(record.clone());
        })
        .await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/groups/:id/messages/stream", "200"])
        .inc();

    let stream = UnboundedReceiverStream::new(rx).filter_map(move |record| {
        let _keep_alive = &subscription;
        Event::default().event("message").json_data(&record).ok().map(Ok)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
