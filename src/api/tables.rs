//! Generic table endpoints
//!
//! Thin JSON wrapper over the table accessor for the browser bundle.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::collections::HashMap;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::dto::{DataResponse, ListResponse, RemovedResponse};
use crate::AppState;
use crate::data::{Fields, ListQuery, OrderBy, Record, validate_table_name};
use crate::error::AppError;
use crate::metrics::HTTP_REQUESTS_TOTAL;

/// Build a list query from the query string
///
/// `order=col.asc|col.desc` and `limit=n` are reserved; every other
/// parameter is an equality filter.
pub fn parse_list_query(params: HashMap<String, String>) -> Result<ListQuery, AppError> {
    let mut query = ListQuery::new();
    for (key, value) in params {
        match key.as_str() {
            "order" => query = query.order_by(parse_order(&value)?),
            "limit" => {
                let limit = value.parse::<usize>().map_err(|_| {
                    AppError::Validation(format!("limit must be a non-negative integer, got {value}"))
                })?;
                query = query.limit(limit);
            }
            _ => query = query.eq(key, value),
        }
    }
    Ok(query)
}

fn parse_order(raw: &str) -> Result<OrderBy, AppError> {
    let (column, direction) = raw.rsplit_once('.').unwrap_or((raw, "asc"));
    if column.is_empty() {
        return Err(AppError::Validation("order column must not be empty".to_string()));
    }
    match direction {
        "asc" => Ok(OrderBy::asc(column)),
        "desc" => Ok(OrderBy::desc(column)),
        other => Err(AppError::Validation(format!(
            "order direction must be asc or desc, got {other}"
        ))),
    }
}

/// GET /api/tables/:table
pub async fn list_records(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListResponse>, AppError> {
    validate_table_name(&table)?;
    let query = parse_list_query(params)?;

    let page = state.data.list(&table, &query).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/tables/:table", "200"])
        .inc();
    Ok(Json(page.into()))
}

/// POST /api/tables/:table
pub async fn create_record(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(fields): Json<Fields>,
) -> Result<(StatusCode, Json<DataResponse<Record>>), AppError> {
    let created = state.data.create(&table, fields).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/tables/:table", "201"])
        .inc();
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// PATCH /api/tables/:table/:id
pub async fn update_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    Json(fields): Json<Fields>,
) -> Result<Json<DataResponse<Record>>, AppError> {
    let updated = state.data.update(&table, &id, fields).await?;
    let degraded = updated.is_degraded();
    let record = updated.into_inner().ok_or(AppError::NotFound)?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["PATCH", "/api/tables/:table/:id", "200"])
        .inc();
    Ok(Json(DataResponse {
        data: record,
        degraded,
    }))
}

/// DELETE /api/tables/:table/:id
pub async fn delete_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Result<Json<RemovedResponse>, AppError> {
    let removed = state.data.remove(&table, &id).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["DELETE", "/api/tables/:table/:id", "200"])
        .inc();
    Ok(Json(RemovedResponse {
        degraded: removed.is_degraded(),
        removed: removed.into_inner(),
    }))
}

/// GET /api/tables/:table/changes
///
/// Server-sent `change` events for rows pushed by the remote. Without a
/// live remote subscription the stream ends immediately.
pub async fn stream_changes(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    validate_table_name(&table)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = state
        .data
        .subscribe(&table, move |event| {
            let _ = tx.send(event.clone());
        })
        .await;
    if !subscription.is_active() {
        tracing::debug!(table = %table, "No live change subscription; closing stream");
    }

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/tables/:table/changes", "200"])
        .inc();

    // The subscription lives as long as the client stays connected.
    let stream = UnboundedReceiverStream::new(rx).filter_map(move |event| {
        let _keep_alive = &subscription;
        Event::default().event("change").json_data(&event).ok().map(Ok)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reserved_params_are_not_filters() {
        let query = parse_list_query(params(&[
            ("order", "votes.desc"),
            ("limit", "10"),
            ("club", "PSG"),
        ]))
        .unwrap();

        assert_eq!(query.order_by, Some(OrderBy::desc("votes")));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.filter.get("club"), Some(&json!("PSG")));
    }

    #[test]
    fn order_without_direction_is_ascending() {
        let query = parse_list_query(params(&[("order", "name")])).unwrap();
        assert_eq!(query.order_by, Some(OrderBy::asc("name")));
    }

    #[test]
    fn column_names_may_contain_dots_before_direction() {
        assert_eq!(parse_order("stats.goals.desc").unwrap(), OrderBy::desc("stats.goals"));
    }

    #[test]
    fn rejects_bad_limit_and_direction() {
        assert!(matches!(
            parse_list_query(params(&[("limit", "ten")])),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_list_query(params(&[("order", "votes.sideways")])),
            Err(AppError::Validation(_))
        ));
    }
}
