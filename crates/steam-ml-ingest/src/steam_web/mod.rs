//! Steam Web API app catalog
//!
//! `IStoreService/GetAppList/v1/` lists every app, paginated by appid. One
//! run walks all pages, keeps the concatenated raw entries as a single raw
//! capture and replaces the catalog snapshot wholesale.

use crate::config::{sources, DataLayout, IngestConfig};
use crate::error::{IngestError, Result};
use crate::fetch::FetchClient;
use crate::normalize::{json_appid, scalar_from_json};
use crate::store::{snapshot, RawArtifact};
use serde_json::{json, Value};
use std::path::PathBuf;
use steam_ml_common::types::{Record, Scalar};
use tracing::{debug, info, warn};

pub const ARTIFACT_NAME: &str = "app_list";

/// Default `max_results` per page
pub const DEFAULT_PAGE_SIZE: u32 = 50_000;

/// Columns every catalog snapshot has, even an empty one
pub const CATALOG_COLUMNS: &[&str] = &["appid", "name", "last_modified"];

/// One page of the listing
#[derive(Debug, Default)]
struct AppListPage {
    apps: Vec<Value>,
    have_more_results: Option<bool>,
    last_appid: Option<i64>,
}

fn parse_page(url: &str, body: &Value) -> Result<AppListPage> {
    let object = body.as_object().ok_or_else(|| {
        IngestError::invalid_payload(format!("{}: expected a JSON object", url))
    })?;

    // The final page may come back without a `response` or `apps` field.
    let Some(response) = object.get("response") else {
        return Ok(AppListPage::default());
    };

    let apps = match response.get("apps") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(apps)) => apps.clone(),
        Some(other) => {
            return Err(IngestError::invalid_payload(format!(
                "{}: 'response.apps' is not an array but {}",
                url, other
            )))
        },
    };

    Ok(AppListPage {
        apps,
        have_more_results: response.get("have_more_results").and_then(Value::as_bool),
        last_appid: response.get("last_appid").and_then(json_appid),
    })
}

/// Normalize one listing entry. `None` when it carries no integer appid.
pub fn catalog_entry(entry: &Value) -> Option<Record> {
    let appid = entry.get("appid").and_then(Value::as_i64)?;
    let field = |name: &str| entry.get(name).map(scalar_from_json).unwrap_or_default();

    let mut record = Record::new();
    record.insert("appid".to_string(), Scalar::Int(appid));
    record.insert("name".to_string(), field("name"));
    record.insert("last_modified".to_string(), field("last_modified"));
    if let Some(value) = entry.get("price_change_number") {
        record.insert("price_change_number".to_string(), scalar_from_json(value));
    }
    Some(record)
}

/// Result of a catalog run
#[derive(Debug, Clone)]
pub struct CatalogRunSummary {
    pub pages: usize,
    /// Entries written to the snapshot
    pub apps: usize,
    /// Entries dropped for lacking an integer appid
    pub skipped: usize,
    pub raw: RawArtifact,
    pub snapshot: PathBuf,
}

pub struct AppListIngestor {
    client: FetchClient,
    url: String,
    layout: DataLayout,
    api_key: String,
}

impl AppListIngestor {
    pub fn new(
        client: FetchClient,
        url: impl Into<String>,
        layout: DataLayout,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            layout,
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &IngestConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::new(
            config.fetch_client()?,
            config.endpoints.app_list_url(),
            config.layout(),
            api_key,
        ))
    }

    /// Fetch the whole catalog and replace the snapshot.
    ///
    /// Any failure aborts the run before anything is written.
    pub async fn run(&self, page_size: u32, include_dlc: bool) -> Result<CatalogRunSummary> {
        if page_size == 0 {
            return Err(IngestError::config("page size must be greater than 0"));
        }

        info!(page_size, include_dlc, "Fetching Steam app list");

        let mut raw_entries: Vec<Value> = Vec::new();
        let mut pages = 0usize;
        let mut cursor: i64 = 0;

        loop {
            let params = [
                ("key", self.api_key.clone()),
                ("max_results", page_size.to_string()),
                ("last_appid", cursor.to_string()),
                ("include_dlc", include_dlc.to_string()),
            ];
            let body = self.client.fetch(&self.url, &params).await?;
            let page = parse_page(&self.url, &body)?;

            if page.apps.is_empty() {
                debug!(cursor, "Empty page, listing complete");
                break;
            }
            pages += 1;

            let page_len = page.apps.len();
            let next_cursor = page
                .last_appid
                .or_else(|| page.apps.last().and_then(|e| e.get("appid")).and_then(json_appid));
            raw_entries.extend(page.apps);

            info!(
                page = pages,
                entries = page_len,
                total = raw_entries.len(),
                "Fetched app list page"
            );

            let more = page
                .have_more_results
                .unwrap_or(page_len >= page_size as usize);
            if !more {
                break;
            }

            match next_cursor {
                Some(next) if next > cursor => cursor = next,
                other => {
                    return Err(IngestError::invalid_payload(format!(
                        "{}: pagination cursor did not advance past {} (got {:?})",
                        self.url, cursor, other
                    )))
                },
            }
        }

        let mut records = Vec::with_capacity(raw_entries.len());
        let mut skipped = 0usize;
        for entry in &raw_entries {
            match catalog_entry(entry) {
                Some(record) => records.push(record),
                None => {
                    skipped += 1;
                    warn!(entry = %entry, "Skipping app list entry without integer appid");
                },
            }
        }

        let raw = self.layout.raw_store().persist(
            sources::STEAM_WEB,
            ARTIFACT_NAME,
            &json!({ "apps": raw_entries }),
        )?;

        let snapshot_path = self.layout.app_list_snapshot();
        snapshot::write_with_columns(&snapshot_path, &records, CATALOG_COLUMNS)?;

        info!(
            pages,
            apps = records.len(),
            skipped,
            path = %snapshot_path.display(),
            "App list ingest complete"
        );

        Ok(CatalogRunSummary {
            pages,
            apps: records.len(),
            skipped,
            raw,
            snapshot: snapshot_path,
        })
    }
}
