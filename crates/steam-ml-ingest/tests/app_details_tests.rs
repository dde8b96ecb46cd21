//! Integration tests for the incremental app details ingest
//!
//! Covers:
//! - Frontier and batch selection against an existing details snapshot
//! - Success, "no data" and deferred outcomes per app
//! - Resuming in a later run
//! - Aborting on permanent errors without writing anything
//! - Prerequisite checks on the catalog snapshot

mod common;

use common::{column_ids, detail_row, fast_client, write_catalog};
use serde_json::{json, Value};
use std::time::Duration;
use steam_ml_common::types::{record, Scalar};
use steam_ml_ingest::config::DataLayout;
use steam_ml_ingest::steam_store::{AppDetailsIngestor, DetailRunRequest};
use steam_ml_ingest::store::snapshot;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const DETAILS_PATH: &str = "/api/appdetails";

fn details_body(appid: i64, name: &str) -> Value {
    json!({
        appid.to_string(): {
            "success": true,
            "data": {
                "type": "game",
                "name": name,
                "steam_appid": appid,
                "is_free": false,
                "price_overview": {"currency": "USD", "final": 1999},
                "genres": [{"id": "1", "description": "Action"}]
            }
        }
    })
}

async fn mount_app(server: &MockServer, appid: i64, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(DETAILS_PATH))
        .and(query_param("appids", appid.to_string()))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_found(server: &MockServer, appid: i64, name: &str, times: u64) {
    let response = ResponseTemplate::new(200).set_body_json(details_body(appid, name));
    mount_app(server, appid, response, times).await;
}

fn ingestor(server: &MockServer, layout: &DataLayout) -> AppDetailsIngestor {
    AppDetailsIngestor::new(
        fast_client(2),
        format!("{}{}", server.uri(), DETAILS_PATH),
        layout.clone(),
    )
}

fn request(layout: &DataLayout, limit: Option<usize>) -> DetailRunRequest {
    DetailRunRequest::new(layout.app_list_snapshot())
        .with_limit(limit)
        .with_request_delay(Duration::ZERO)
}

/// Catalog [1..5] with details for 1 and 3 already present.
fn seed(layout: &DataLayout) {
    write_catalog(layout, &[1, 2, 3, 4, 5]);
    snapshot::merge(
        &layout.app_details_snapshot(),
        vec![detail_row(1, "App 1"), detail_row(3, "App 3")],
        "appid",
    )
    .unwrap();
}

#[tokio::test]
async fn test_batch_takes_first_missing_apps() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    seed(&layout);

    mount_found(&mock_server, 2, "Two", 1).await;
    mount_found(&mock_server, 4, "Four", 1).await;

    let summary = ingestor(&mock_server, &layout)
        .run(&request(&layout, Some(2)))
        .await
        .unwrap();

    assert_eq!(summary.frontier_size, 3);
    assert_eq!(summary.batch, vec![2, 4]);
    assert_eq!(summary.fetched, 2);
    assert!(summary.deferred.is_empty());

    let path = layout.app_details_snapshot();
    assert_eq!(column_ids(&path, "appid"), vec![1, 3, 2, 4]);

    let rows = snapshot::read(&path).unwrap();
    assert_eq!(rows[2]["name"], Scalar::from("Two"));
    assert_eq!(rows[2]["success"], Scalar::Bool(true));
    assert_eq!(rows[2]["price_overview.final"], Scalar::Int(1999));
    let genres: Value = serde_json::from_str(&rows[3]["genres"].render()).unwrap();
    assert_eq!(genres, json!([{"id": "1", "description": "Action"}]));
}

#[tokio::test(start_paused = true)]
async fn test_request_delay_only_between_requests() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    write_catalog(&layout, &[1, 2, 3]);

    for appid in [1, 2, 3] {
        mount_found(&mock_server, appid, &format!("App {}", appid), 1).await;
    }

    let request = DetailRunRequest::new(layout.app_list_snapshot())
        .with_request_delay(Duration::from_millis(300));

    let started = tokio::time::Instant::now();
    let summary = ingestor(&mock_server, &layout).run(&request).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.fetched, 3);
    // Two pauses for three requests, none before the first
    assert!(elapsed >= Duration::from_millis(600), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(900), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_no_data_is_recorded_and_transient_is_deferred() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    seed(&layout);

    // Two attempts per request, both failing
    mount_app(&mock_server, 2, ResponseTemplate::new(503), 2).await;
    mount_app(
        &mock_server,
        4,
        ResponseTemplate::new(200).set_body_json(json!({"4": {"success": false}})),
        1,
    )
    .await;

    let summary = ingestor(&mock_server, &layout)
        .run(&request(&layout, Some(2)))
        .await
        .unwrap();

    assert_eq!(summary.batch, vec![2, 4]);
    assert_eq!(summary.deferred, vec![2]);
    assert_eq!(summary.unavailable, 1);
    assert_eq!(summary.fetched, 0);

    let path = layout.app_details_snapshot();
    assert_eq!(column_ids(&path, "appid"), vec![1, 3, 4]);
    let rows = snapshot::read(&path).unwrap();
    assert_eq!(rows[2]["success"], Scalar::Bool(false));
    assert_eq!(rows[2]["name"], Scalar::Null);

    // The raw capture holds the one body that was obtained
    let raw: Value =
        serde_json::from_slice(&std::fs::read(summary.raw.unwrap().path).unwrap()).unwrap();
    assert_eq!(raw["apps"], json!([{"4": {"success": false}}]));
    assert_eq!(raw["meta"]["count"], json!(1));
    assert_eq!(raw["meta"]["cc"], json!("us"));
    assert_eq!(raw["meta"]["language"], json!("english"));
    assert!(raw["meta"]["fetched_at"].is_string());
}

#[tokio::test]
async fn test_next_run_resumes_with_deferred_and_remaining() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    write_catalog(&layout, &[1, 2, 3, 4, 5]);
    snapshot::merge(
        &layout.app_details_snapshot(),
        vec![
            detail_row(1, "App 1"),
            detail_row(3, "App 3"),
            record([("appid", Scalar::Int(4)), ("success", Scalar::Bool(false))]),
        ],
        "appid",
    )
    .unwrap();

    mount_found(&mock_server, 2, "Two", 1).await;
    mount_found(&mock_server, 5, "Five", 1).await;

    let summary = ingestor(&mock_server, &layout)
        .run(&request(&layout, Some(10)))
        .await
        .unwrap();

    // 4 was resolved as "no data" and is not asked for again
    assert_eq!(summary.batch, vec![2, 5]);
    assert_eq!(column_ids(&layout.app_details_snapshot(), "appid"), vec![1, 3, 4, 2, 5]);

    // Everything resolved: a further run is a no-op
    let again = ingestor(&mock_server, &layout)
        .run(&request(&layout, None))
        .await
        .unwrap();
    assert!(again.is_noop());
    assert!(again.is_complete());
    assert_eq!(again.frontier_size, 0);
    assert!(again.merge.is_none());
}

#[tokio::test]
async fn test_noop_run_writes_nothing() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    write_catalog(&layout, &[1, 3]);
    snapshot::merge(
        &layout.app_details_snapshot(),
        vec![detail_row(1, "a"), detail_row(3, "c")],
        "appid",
    )
    .unwrap();
    let before = std::fs::read(layout.app_details_snapshot()).unwrap();

    let summary = ingestor(&mock_server, &layout)
        .run(&request(&layout, Some(5)))
        .await
        .unwrap();

    assert!(summary.is_noop());
    assert!(summary.raw.is_none());
    assert!(!layout.raw_store().path_for("steam_store", "app_details").exists());
    assert_eq!(std::fs::read(layout.app_details_snapshot()).unwrap(), before);
}

#[tokio::test]
async fn test_zero_limit_fetches_nothing() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    write_catalog(&layout, &[1, 2, 3]);

    let summary = ingestor(&mock_server, &layout)
        .run(&request(&layout, Some(0)))
        .await
        .unwrap();

    assert!(summary.is_noop());
    assert!(!summary.is_complete());
    assert_eq!(summary.frontier_size, 3);
    assert!(!layout.app_details_snapshot().exists());
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_permanent_error_aborts_without_writing() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    seed(&layout);
    let before = std::fs::read(layout.app_details_snapshot()).unwrap();

    mount_found(&mock_server, 2, "Two", 1).await;
    mount_app(&mock_server, 4, ResponseTemplate::new(400).set_body_string("bad request"), 1).await;
    mount_found(&mock_server, 5, "Five", 0).await;

    let err = ingestor(&mock_server, &layout)
        .run(&request(&layout, None))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "PermanentRequestError");
    assert_eq!(std::fs::read(layout.app_details_snapshot()).unwrap(), before);
    assert!(!layout.raw_store().path_for("steam_store", "app_details").exists());
}

#[tokio::test]
async fn test_first_run_creates_details_snapshot() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    write_catalog(&layout, &[7, 7, 8]);

    mount_found(&mock_server, 7, "Seven", 1).await;
    mount_app(
        &mock_server,
        8,
        ResponseTemplate::new(200).set_body_json(json!({"8": null})),
        1,
    )
    .await;

    let summary = ingestor(&mock_server, &layout)
        .run(&request(&layout, None))
        .await
        .unwrap();

    assert_eq!(summary.batch, vec![7, 8]);
    let merge = summary.merge.unwrap();
    assert_eq!(merge.inserted, 2);
    assert_eq!(merge.total, 2);
}

#[tokio::test]
async fn test_missing_catalog_is_configuration_error() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());

    let err = ingestor(&mock_server, &layout)
        .run(&request(&layout, Some(1)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "ConfigurationError");
    assert!(err.to_string().contains("app-list"));
}

#[tokio::test]
async fn test_catalog_without_appid_column_is_configuration_error() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    snapshot::write(
        &layout.app_list_snapshot(),
        &[record([("name", Scalar::from("nameless"))])],
    )
    .unwrap();

    let err = ingestor(&mock_server, &layout)
        .run(&request(&layout, Some(1)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "ConfigurationError");
}
