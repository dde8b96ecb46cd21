//! Identifier-keyed Parquet snapshots
//!
//! A snapshot is a single Parquet file holding the current state of one
//! record type. Every write is staged into a temporary file next to the
//! target and renamed over it, so readers only ever see the previous or the
//! next complete file.

use super::columnar::{self, Table};
use super::raw::parent_dir;
use crate::error::{IngestError, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use steam_ml_common::types::{Record, Scalar};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Counts reported by [`merge`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Keys that were not in the snapshot before
    pub inserted: usize,
    /// Existing keys whose record was replaced
    pub updated: usize,
    /// Rows in the snapshot after the merge
    pub total: usize,
}

/// A fully serialized snapshot waiting to replace its target.
///
/// Dropping it without calling [`StagedSnapshot::commit`] removes the
/// temporary file and leaves the target untouched.
#[derive(Debug)]
pub struct StagedSnapshot {
    target: PathBuf,
    file: NamedTempFile,
    rows: usize,
    columns: usize,
}

impl StagedSnapshot {
    /// Location of the staged temporary file
    pub fn staged_path(&self) -> &Path {
        self.file.path()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Atomically move the staged file over the target.
    pub fn commit(self) -> Result<PathBuf> {
        let Self {
            target,
            file,
            rows,
            columns,
        } = self;

        file.persist(&target)
            .map_err(|e| IngestError::persistence(&target, e.error))?;

        info!(path = %target.display(), rows, columns, "Wrote snapshot");
        Ok(target)
    }
}

/// Serialize `records` into a temporary file beside `path`.
///
/// The column set is `seed_columns` followed by the union of the record keys
/// in first-seen order.
pub fn stage(path: &Path, records: &[Record], seed_columns: &[&str]) -> Result<StagedSnapshot> {
    let columns = columnar::column_order(records, seed_columns);
    if columns.is_empty() {
        return Err(IngestError::persistence(
            path,
            "a snapshot needs at least one column",
        ));
    }

    let batch = columnar::encode_batch(records, &columns)
        .map_err(|e| IngestError::persistence(path, e))?;

    let parent = parent_dir(path);
    std::fs::create_dir_all(parent).map_err(|e| IngestError::persistence(path, e))?;

    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let mut file = tempfile::Builder::new()
        .prefix(&format!(".{}.", stem))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| IngestError::persistence(path, e))?;

    columnar::write_parquet(file.as_file_mut(), &batch)
        .map_err(|e| IngestError::persistence(path, e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| IngestError::persistence(path, e))?;

    debug!(
        path = %path.display(),
        staged = %file.path().display(),
        rows = records.len(),
        "Staged snapshot"
    );

    Ok(StagedSnapshot {
        target: path.to_path_buf(),
        file,
        rows: records.len(),
        columns: columns.len(),
    })
}

/// Replace the snapshot at `path` with `records`.
pub fn write(path: &Path, records: &[Record]) -> Result<()> {
    write_with_columns(path, records, &[])
}

/// Replace the snapshot at `path`, guaranteeing `seed_columns` exist even
/// when `records` is empty.
pub fn write_with_columns(path: &Path, records: &[Record], seed_columns: &[&str]) -> Result<()> {
    stage(path, records, seed_columns)?.commit()?;
    Ok(())
}

/// Read a snapshot along with its column names.
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IngestError::NotFound {
            path: path.to_path_buf(),
        },
        _ => IngestError::corrupt(path, e),
    })?;

    columnar::read_parquet(file).map_err(|e| IngestError::corrupt(path, e))
}

/// Read all records of a snapshot in file order.
pub fn read(path: &Path) -> Result<Vec<Record>> {
    Ok(read_table(path)?.records)
}

/// Like [`read`], but a missing snapshot is an empty one.
pub fn read_or_empty(path: &Path) -> Result<Vec<Record>> {
    match read(path) {
        Err(IngestError::NotFound { .. }) => Ok(Vec::new()),
        other => other,
    }
}

fn key_of(record: &Record, key_field: &str) -> Option<String> {
    record.get(key_field).and_then(Scalar::key_text)
}

/// Upsert `new_records` into the snapshot at `path` by `key_field`.
///
/// Existing rows with a matching key are replaced in place, other existing
/// rows are kept as they are, and unseen keys are appended in arrival order.
/// When the same key occurs more than once in `new_records` the last one
/// wins. An empty `new_records` leaves an existing snapshot untouched.
pub fn merge(path: &Path, new_records: Vec<Record>, key_field: &str) -> Result<MergeOutcome> {
    let mut keyed = Vec::with_capacity(new_records.len());
    for (position, record) in new_records.into_iter().enumerate() {
        let key = key_of(&record, key_field).ok_or_else(|| {
            IngestError::invalid_payload(format!(
                "record #{} has no '{}' value to merge on",
                position, key_field
            ))
        })?;
        keyed.push((key, record));
    }

    let existing = match read_table(path) {
        Ok(table) => Some(table),
        Err(IngestError::NotFound { .. }) => None,
        Err(e) => return Err(e),
    };

    if keyed.is_empty() {
        if let Some(table) = &existing {
            debug!(path = %path.display(), "Nothing to merge");
            return Ok(MergeOutcome {
                total: table.records.len(),
                ..MergeOutcome::default()
            });
        }
    }

    let Table {
        columns: existing_columns,
        records: mut rows,
    } = existing.unwrap_or_default();
    let existing_len = rows.len();

    let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len() + keyed.len());
    for (i, row) in rows.iter().enumerate() {
        if let Some(key) = key_of(row, key_field) {
            index.entry(key).or_insert(i);
        }
    }

    let mut replaced = HashSet::new();
    let mut inserted = 0;
    for (key, record) in keyed {
        match index.get(&key) {
            Some(&i) => {
                rows[i] = record;
                if i < existing_len {
                    replaced.insert(i);
                }
            },
            None => {
                index.insert(key, rows.len());
                rows.push(record);
                inserted += 1;
            },
        }
    }

    let seed: Vec<&str> = existing_columns
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(key_field))
        .collect();
    stage(path, &rows, &seed)?.commit()?;

    Ok(MergeOutcome {
        inserted,
        updated: replaced.len(),
        total: rows.len(),
    })
}
