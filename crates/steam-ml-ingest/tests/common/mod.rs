//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;
use steam_ml_common::types::{record, Record, Scalar};
use steam_ml_ingest::config::DataLayout;
use steam_ml_ingest::fetch::{FetchClient, RetryPolicy};
use steam_ml_ingest::store::snapshot;

/// Retry policy with millisecond waits
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter_ratio: 0.0,
    }
}

pub fn fast_client(max_attempts: u32) -> FetchClient {
    FetchClient::new(Duration::from_secs(5), fast_policy(max_attempts)).unwrap()
}

pub fn catalog_row(appid: i64) -> Record {
    record([
        ("appid", Scalar::Int(appid)),
        ("name", Scalar::from(format!("App {}", appid))),
        ("last_modified", Scalar::Int(1_700_000_000)),
    ])
}

/// Write a catalog snapshot holding `ids` in the given order.
pub fn write_catalog(layout: &DataLayout, ids: &[i64]) {
    let rows: Vec<Record> = ids.iter().map(|&id| catalog_row(id)).collect();
    snapshot::write_with_columns(&layout.app_list_snapshot(), &rows, &["appid"]).unwrap();
}

pub fn detail_row(appid: i64, name: &str) -> Record {
    record([
        ("appid", Scalar::Int(appid)),
        ("success", Scalar::Bool(true)),
        ("name", Scalar::from(name)),
    ])
}

/// Integer values of `column` in file order.
pub fn column_ids(path: &Path, column: &str) -> Vec<i64> {
    snapshot::read(path)
        .unwrap()
        .iter()
        .filter_map(|r| r.get(column).and_then(Scalar::as_i64))
        .collect()
}
