//! On-disk persistence: raw JSON captures and Parquet snapshots.

pub mod columnar;
pub mod raw;
pub mod snapshot;

pub use columnar::Table;
pub use raw::{RawArtifact, RawStore};
pub use snapshot::{MergeOutcome, StagedSnapshot};
