//! Steam Store app details, fetched incrementally
//!
//! Each run compares the catalog snapshot with the details snapshot, fetches
//! `appdetails` for a bounded slice of the apps that have no details yet and
//! merges the results. Rerunning with the same inputs continues where the
//! previous run stopped.
//!
//! Per app the store answers in one of three ways:
//! - `{"<appid>": {"success": true, "data": {...}}}`: a details record;
//! - a missing entry or `success: false`: the app has no store page. It is
//!   recorded as `{appid, success: false}` so it is not asked for again;
//! - a failure that outlasts the retries: the app is deferred and stays in
//!   the frontier of the next run.

use crate::config::{sources, DataLayout, IngestConfig};
use crate::error::{IngestError, Result};
use crate::fetch::FetchClient;
use crate::normalize::flatten_object;
use crate::progress::create_progress_bar;
use crate::store::{snapshot, MergeOutcome, RawArtifact};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use steam_ml_common::types::{Record, Scalar};
use tracing::{debug, info, warn};

pub const ARTIFACT_NAME: &str = "app_details";

/// Identifier column shared by catalog and details
pub const KEY_FIELD: &str = "appid";

pub const DEFAULT_LIMIT: usize = 200;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_COUNTRY_CODE: &str = "us";
pub const DEFAULT_LANGUAGE: &str = "english";

/// Parameters of one detail run
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRunRequest {
    /// Catalog snapshot to take app ids from
    pub app_list_path: PathBuf,
    /// Most apps to fetch in this run; `None` fetches the whole frontier
    pub limit: Option<usize>,
    /// Pause between two consecutive requests
    pub request_delay: Duration,
    pub country_code: String,
    pub language: String,
}

impl DetailRunRequest {
    pub fn new(app_list_path: impl Into<PathBuf>) -> Self {
        Self {
            app_list_path: app_list_path.into(),
            limit: Some(DEFAULT_LIMIT),
            request_delay: DEFAULT_REQUEST_DELAY,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

/// Result of a detail run
#[derive(Debug, Clone, Default)]
pub struct DetailRunSummary {
    /// Apps without details before the run
    pub frontier_size: usize,
    /// Apps attempted in this run
    pub batch: Vec<i64>,
    /// Apps with a details record
    pub fetched: usize,
    /// Apps the store has no data for
    pub unavailable: usize,
    /// Apps left for a later run after transient failures
    pub deferred: Vec<i64>,
    /// `None` when the run had nothing to do
    pub merge: Option<MergeOutcome>,
    pub raw: Option<RawArtifact>,
}

impl DetailRunSummary {
    pub fn is_noop(&self) -> bool {
        self.batch.is_empty()
    }

    /// Every catalog app already had a details record.
    pub fn is_complete(&self) -> bool {
        self.frontier_size == 0
    }
}

/// Catalog ids without details, in catalog order, each once.
pub fn compute_frontier(catalog_ids: &[i64], known: &HashSet<i64>) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(catalog_ids.len());
    catalog_ids
        .iter()
        .copied()
        .filter(|id| !known.contains(id) && seen.insert(*id))
        .collect()
}

/// The first `limit` ids of the frontier.
pub fn select_batch(frontier: &[i64], limit: Option<usize>) -> &[i64] {
    match limit {
        Some(limit) => &frontier[..limit.min(frontier.len())],
        None => frontier,
    }
}

/// What one `appdetails` response means for one app
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Available(Record),
    Unavailable(Record),
    /// The body is not something the store sends; try again next run
    Malformed,
}

/// Interpret an `appdetails` body for `appid`.
pub fn interpret_response(appid: i64, body: &Value) -> DetailOutcome {
    let Some(object) = body.as_object() else {
        return DetailOutcome::Malformed;
    };

    let entry = object.get(&appid.to_string()).and_then(Value::as_object);
    let succeeded = entry
        .and_then(|e| e.get("success"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut record = match entry {
        Some(entry) if succeeded => match entry.get("data") {
            Some(Value::Object(data)) => flatten_object(data),
            _ => Record::new(),
        },
        _ => Record::new(),
    };
    record.insert(KEY_FIELD.to_string(), Scalar::Int(appid));
    record.insert("success".to_string(), Scalar::Bool(succeeded));

    if succeeded {
        DetailOutcome::Available(record)
    } else {
        DetailOutcome::Unavailable(record)
    }
}

/// App ids of the catalog snapshot, in file order.
fn catalog_ids(path: &Path) -> Result<Vec<i64>> {
    let table = snapshot::read_table(path).map_err(|e| match e {
        IngestError::NotFound { path } => IngestError::config(format!(
            "app list snapshot '{}' not found; run the app-list ingest first",
            path.display()
        )),
        other => other,
    })?;

    if !table.columns.iter().any(|c| c == KEY_FIELD) {
        return Err(IngestError::config(format!(
            "app list snapshot '{}' has no '{}' column",
            path.display(),
            KEY_FIELD
        )));
    }

    Ok(table
        .records
        .iter()
        .filter_map(|r| r.get(KEY_FIELD).and_then(Scalar::as_i64))
        .collect())
}

pub struct AppDetailsIngestor {
    client: FetchClient,
    url: String,
    layout: DataLayout,
}

impl AppDetailsIngestor {
    pub fn new(client: FetchClient, url: impl Into<String>, layout: DataLayout) -> Self {
        Self {
            client,
            url: url.into(),
            layout,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self::new(
            config.fetch_client()?,
            config.endpoints.app_details_url(),
            config.layout(),
        ))
    }

    /// Fetch details for the next slice of the frontier and merge them.
    pub async fn run(&self, request: &DetailRunRequest) -> Result<DetailRunSummary> {
        let catalog = catalog_ids(&request.app_list_path)?;

        let details_path = self.layout.app_details_snapshot();
        let known: HashSet<i64> = snapshot::read_or_empty(&details_path)?
            .iter()
            .filter_map(|r| r.get(KEY_FIELD).and_then(Scalar::as_i64))
            .collect();

        let frontier = compute_frontier(&catalog, &known);
        let batch = select_batch(&frontier, request.limit).to_vec();

        info!(
            catalog = catalog.len(),
            known = known.len(),
            frontier = frontier.len(),
            batch = batch.len(),
            "Computed app details frontier"
        );

        let mut summary = DetailRunSummary {
            frontier_size: frontier.len(),
            batch,
            ..DetailRunSummary::default()
        };
        if summary.is_complete() {
            info!("Every catalog app already has details, nothing to do");
            return Ok(summary);
        }
        if summary.is_noop() {
            info!(frontier = summary.frontier_size, "Batch limit is 0, nothing to do");
            return Ok(summary);
        }

        let mut bodies: Vec<Value> = Vec::with_capacity(summary.batch.len());
        let mut records: Vec<Record> = Vec::with_capacity(summary.batch.len());

        let pb = create_progress_bar(summary.batch.len() as u64, "Fetching app details");
        for (idx, &appid) in summary.batch.iter().enumerate() {
            if idx > 0 && !request.request_delay.is_zero() {
                tokio::time::sleep(request.request_delay).await;
            }

            debug!(appid, position = idx + 1, of = summary.batch.len(), "Fetching app details");
            let params = [
                ("appids", appid.to_string()),
                ("cc", request.country_code.clone()),
                ("l", request.language.clone()),
            ];

            match self.client.fetch(&self.url, &params).await {
                Ok(body) => {
                    match interpret_response(appid, &body) {
                        DetailOutcome::Available(record) => {
                            summary.fetched += 1;
                            records.push(record);
                        },
                        DetailOutcome::Unavailable(record) => {
                            warn!(appid, "No store data for app");
                            summary.unavailable += 1;
                            records.push(record);
                        },
                        DetailOutcome::Malformed => {
                            warn!(appid, "Unexpected appdetails body, deferring");
                            summary.deferred.push(appid);
                        },
                    }
                    bodies.push(body);
                },
                Err(e) if e.is_transient() => {
                    warn!(appid, error = %e, "Giving up on app for this run");
                    summary.deferred.push(appid);
                },
                Err(e) => {
                    pb.abandon();
                    return Err(e);
                },
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let payload = json!({
            "apps": bodies,
            "meta": {
                "source": request.app_list_path.display().to_string(),
                "count": bodies.len(),
                "cc": request.country_code,
                "language": request.language,
                "fetched_at": chrono::Utc::now().to_rfc3339(),
            },
        });
        summary.raw = Some(
            self.layout
                .raw_store()
                .persist(sources::STEAM_STORE, ARTIFACT_NAME, &payload)?,
        );

        let outcome = snapshot::merge(&details_path, records, KEY_FIELD)?;
        summary.merge = Some(outcome);

        info!(
            fetched = summary.fetched,
            unavailable = summary.unavailable,
            deferred = summary.deferred.len(),
            total = outcome.total,
            "App details ingest complete"
        );
        Ok(summary)
    }
}
