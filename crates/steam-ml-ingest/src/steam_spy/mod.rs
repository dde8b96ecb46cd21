//! SteamSpy aggregate statistics
//!
//! `request=all` returns one object keyed by appid string with owner
//! estimates, playtime and review counts. The snapshot is replaced on every
//! run.

use crate::config::{sources, DataLayout, IngestConfig};
use crate::error::{IngestError, Result};
use crate::fetch::FetchClient;
use crate::normalize::flatten_object;
use crate::store::{snapshot, RawArtifact};
use serde_json::Value;
use std::path::PathBuf;
use steam_ml_common::types::{Record, Scalar};
use tracing::{info, warn};

pub const ARTIFACT_NAME: &str = "all";

/// Result of a SteamSpy run
#[derive(Debug, Clone)]
pub struct SpyRunSummary {
    pub apps: usize,
    /// Entries with a non-integer key or a non-object value
    pub skipped: usize,
    pub raw: RawArtifact,
    pub snapshot: PathBuf,
}

/// Turn the `request=all` body into records ordered by appid.
///
/// Returns the records and the number of skipped entries.
pub fn spy_records(body: &Value) -> Result<(Vec<Record>, usize)> {
    let object = body
        .as_object()
        .ok_or_else(|| IngestError::invalid_payload("SteamSpy response is not a JSON object"))?;

    let mut records = Vec::with_capacity(object.len());
    let mut skipped = 0;
    for (key, value) in object {
        let (Ok(appid), Value::Object(attributes)) = (key.trim().parse::<i64>(), value) else {
            warn!(key = %key, "Skipping SteamSpy entry");
            skipped += 1;
            continue;
        };

        let mut record = flatten_object(attributes);
        record.insert("appid".to_string(), Scalar::Int(appid));
        records.push((appid, record));
    }

    records.sort_by_key(|(appid, _)| *appid);
    Ok((records.into_iter().map(|(_, r)| r).collect(), skipped))
}

pub struct SpyIngestor {
    client: FetchClient,
    url: String,
    layout: DataLayout,
}

impl SpyIngestor {
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
            config.endpoints.spy_api.clone(),
            config.layout(),
        ))
    }

    pub async fn run(&self) -> Result<SpyRunSummary> {
        info!("Fetching SteamSpy 'all' dataset");

        let body = self
            .client
            .fetch(&self.url, &[("request", "all".to_string())])
            .await?;
        let (records, skipped) = spy_records(&body)?;

        let raw = self
            .layout
            .raw_store()
            .persist(sources::STEAM_SPY, ARTIFACT_NAME, &body)?;

        let snapshot_path = self.layout.spy_snapshot();
        snapshot::write_with_columns(&snapshot_path, &records, &["appid"])?;

        info!(apps = records.len(), skipped, "SteamSpy ingest complete");
        Ok(SpyRunSummary {
            apps: records.len(),
            skipped,
            raw,
            snapshot: snapshot_path,
        })
    }
}
