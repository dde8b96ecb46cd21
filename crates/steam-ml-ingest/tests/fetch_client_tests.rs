//! Integration tests for the resilient fetch client
//!
//! Covers:
//! - Retries of 5xx and 429 responses until success or exhaustion
//! - Permanent 4xx failures that are never retried
//! - Timeouts and unparsable bodies as transient failures
//! - Query parameters and the identifying User-Agent

mod common;

use common::fast_client;
use serde_json::json;
use std::time::Duration;
use steam_ml_ingest::fetch::{FetchClient, USER_AGENT};
use steam_ml_ingest::IngestError;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_fetch_parses_json_and_sends_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .and(query_param("appids", "570"))
        .and(query_param("cc", "us"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"570": {"success": true}})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/api/appdetails", mock_server.uri());
    let body = fast_client(3)
        .fetch(&url, &[("appids", "570".to_string()), ("cc", "us".to_string())])
        .await
        .unwrap();

    assert_eq!(body["570"]["success"], json!(true));
}

#[tokio::test]
async fn test_fetch_retries_server_errors_then_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/flaky", mock_server.uri());
    let body = fast_client(5).fetch(&url, &[]).await.unwrap();

    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/throttled"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    let url = format!("{}/throttled", mock_server.uri());
    let err = fast_client(3).fetch(&url, &[]).await.unwrap_err();

    match err {
        IngestError::TransientNetwork { attempts, reason, .. } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("429"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_does_not_retry_client_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Access is denied"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/forbidden", mock_server.uri());
    let err = fast_client(5).fetch(&url, &[]).await.unwrap_err();

    match err {
        IngestError::PermanentRequest { status, message, .. } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Access is denied");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_timeout_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = FetchClient::new(Duration::from_millis(50), common::fast_policy(2)).unwrap();
    let url = format!("{}/slow", mock_server.uri());
    let err = client.fetch(&url, &[]).await.unwrap_err();

    assert!(err.is_transient());
    assert!(matches!(err, IngestError::TransientNetwork { attempts: 2, .. }));
}

#[tokio::test]
async fn test_fetch_malformed_body_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let url = format!("{}/garbled", mock_server.uri());
    let err = fast_client(2).fetch(&url, &[]).await.unwrap_err();

    assert_eq!(err.kind(), "TransientNetworkError");
}

#[tokio::test]
async fn test_fetch_connection_refused_is_transient() {
    // Bind then drop a listener so the port is closed
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let url = format!("http://127.0.0.1:{}/gone", port);
    let err = fast_client(2).fetch(&url, &[]).await.unwrap_err();
    assert!(err.is_transient());
}
