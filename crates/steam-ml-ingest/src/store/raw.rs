//! Raw payload capture
//!
//! Each source keeps exactly one JSON file per artifact: the payload of the
//! most recent run. The capture is the audit trail of a run, so a failed
//! write is fatal for the caller.

use crate::error::{IngestError, Result};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use steam_ml_common::checksum::sha256_hex;
use tracing::info;

/// A raw capture that has been written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic location of an artifact: `<root>/<source>/<artifact>.json`
    pub fn path_for(&self, source_name: &str, artifact_name: &str) -> PathBuf {
        self.root
            .join(source_name)
            .join(format!("{}.json", artifact_name))
    }

    /// Write `payload` for `source_name`, replacing the previous capture.
    pub fn persist(
        &self,
        source_name: &str,
        artifact_name: &str,
        payload: &Value,
    ) -> Result<RawArtifact> {
        let path = self.path_for(source_name, artifact_name);
        let bytes = serde_json::to_vec_pretty(payload)
            .map_err(|e| IngestError::persistence(&path, format!("JSON encoding failed: {}", e)))?;

        write_atomically(&path, &bytes)?;

        let artifact = RawArtifact {
            sha256: sha256_hex(&bytes),
            bytes: bytes.len() as u64,
            path,
        };
        info!(
            path = %artifact.path.display(),
            bytes = artifact.bytes,
            sha256 = %artifact.sha256,
            "Saved raw payload"
        );
        Ok(artifact)
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename it into place.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    std::fs::create_dir_all(parent).map_err(|e| IngestError::persistence(path, e))?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| IngestError::persistence(path, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| IngestError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| IngestError::persistence(path, e.error))?;
    Ok(())
}

/// Directory that holds `path`; `.` for bare file names.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
