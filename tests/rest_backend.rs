//! REST backend against a local HTTP server

mod common;

use axum::http::StatusCode;
use ballondor::data::{
    ListQuery, OrderBy, RemoteBackend, RemoteError, RestBackend, tables,
};
use common::{MockRest, eventually, fields, insert_event, record};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

fn backend(url: &str) -> RestBackend {
    RestBackend::new(url, "test-anon-key", Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn query_sends_filters_order_limit_and_reads_count() {
    let mock = MockRest::start().await;
    for (id, club, votes) in [("1", "PSG", 10), ("2", "PSG", 30), ("3", "Barcelona", 20), ("4", "PSG", 5)] {
        mock.seed(
            tables::PLAYERS,
            record(id, &[("club", json!(club)), ("votes", json!(votes))]),
        );
    }
    let rest = backend(&mock.url);

    let query = ListQuery::new()
        .eq("club", "PSG")
        .order_by(OrderBy::desc("votes"))
        .limit(2);
    let page = rest.query(tables::PLAYERS, &query).await.unwrap();

    let ids: Vec<_> = page.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
    assert_eq!(page.total_count, 3);
}

#[tokio::test]
async fn every_request_carries_the_api_key() {
    let mock = MockRest::start().await;
    let rest = backend(&mock.url);

    rest.query(tables::PLAYERS, &ListQuery::new()).await.unwrap();

    let (apikey, authorization) = mock.last_auth().unwrap();
    assert_eq!(apikey, "test-anon-key");
    assert_eq!(authorization, "Bearer test-anon-key");
}

#[tokio::test]
async fn insert_update_delete_round_trip() {
    let mock = MockRest::start().await;
    let rest = backend(&mock.url);

    let created = rest
        .insert(tables::MESSAGES, fields(&[("body", json!("Allez"))]))
        .await
        .unwrap();
    assert_eq!(created.id, "1");
    assert_eq!(created.get("body"), Some(&json!("Allez")));

    let updated = rest
        .update(tables::MESSAGES, &created.id, fields(&[("body", json!("Allez PSG"))]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.get("body"), Some(&json!("Allez PSG")));
    assert_eq!(updated.created_at, created.created_at);

    assert!(
        rest.update(tables::MESSAGES, "999", fields(&[("body", json!("x"))]))
            .await
            .unwrap()
            .is_none()
    );

    rest.delete(tables::MESSAGES, &created.id).await.unwrap();
    assert!(mock.rows(tables::MESSAGES).is_empty());
}

#[tokio::test]
async fn client_errors_are_rejections_with_message() {
    let mock = MockRest::start().await;
    let rest = backend(&mock.url);
    mock.force_status(Some(StatusCode::CONFLICT));

    match rest.insert(tables::VOTES, fields(&[])).await {
        Err(RemoteError::Rejected { status, message }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "forced 409");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn gateway_errors_and_refused_connections_are_transport() {
    let mock = MockRest::start().await;
    let rest = backend(&mock.url);

    mock.force_status(Some(StatusCode::SERVICE_UNAVAILABLE));
    let error = rest.query(tables::PLAYERS, &ListQuery::new()).await.unwrap_err();
    assert!(error.is_transport());

    // Nothing listens on a freshly released port.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let dead = backend(&format!("http://127.0.0.1:{port}"));
    let error = dead.ping().await.unwrap_err();
    assert!(error.is_transport());
}

#[tokio::test]
async fn ping_treats_any_answer_as_reachable() {
    let mock = MockRest::start().await;
    let rest = backend(&mock.url);

    rest.ping().await.unwrap();
    mock.force_status(Some(StatusCode::UNAUTHORIZED));
    rest.ping().await.unwrap();
    mock.force_status(Some(StatusCode::GATEWAY_TIMEOUT));
    assert!(rest.ping().await.is_err());
}

#[tokio::test]
async fn realtime_stream_yields_change_events() {
    let mock = MockRest::start().await;
    let rest = backend(&mock.url);

    let mut stream = rest.subscribe(tables::MESSAGES).await.unwrap();
    assert!(eventually(|| mock.stream_count() == 1).await);

    let message = record("m1", &[("body", json!("live"))]);
    mock.push(insert_event(tables::MESSAGES, message.clone()));

    let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.record, Some(message));
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let mock = MockRest::start().await;
    mock.seed(tables::GROUPS, record("g1", &[]));
    let rest = backend(&format!("{}/", mock.url));

    let page = rest.query(tables::GROUPS, &ListQuery::new()).await.unwrap();
    assert_eq!(page.records.len(), 1);
}
