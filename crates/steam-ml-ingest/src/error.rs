//! Error types for the ingestion core
//!
//! Every failure surfaced by a fetch, a store or an ingestor is one of the
//! kinds below. `kind()` gives the stable name the CLI prints before the
//! message.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Timeout, connection failure, 5xx, 429 or an unreadable 2xx body.
    /// Retried by the fetch layer; `attempts` counts every try made.
    #[error("{url}: {reason} (after {attempts} attempt(s))")]
    TransientNetwork {
        url: String,
        reason: String,
        attempts: u32,
    },

    /// Non-retryable rejection (4xx other than 429).
    #[error("{url} returned HTTP {status}: {message}")]
    PermanentRequest {
        url: String,
        status: u16,
        message: String,
    },

    /// A raw capture or snapshot could not be written.
    #[error("cannot write '{}': {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    /// Missing or invalid prerequisite input, detected before network activity.
    #[error("{0}")]
    Configuration(String),

    /// A snapshot that was asked for does not exist.
    #[error("snapshot '{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    /// An existing snapshot could not be decoded.
    #[error("snapshot '{}' is unreadable: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// A response or record is structurally unusable.
    #[error("{0}")]
    InvalidPayload(String),
}

impl IngestError {
    pub fn transient(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientNetwork {
            url: url.into(),
            reason: reason.into(),
            attempts: 1,
        }
    }

    pub fn persistence(path: impl AsRef<Path>, reason: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, reason: impl std::fmt::Display) -> Self {
        Self::CorruptSnapshot {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork { .. } => "TransientNetworkError",
            Self::PermanentRequest { .. } => "PermanentRequestError",
            Self::Persistence { .. } => "PersistenceError",
            Self::Configuration(_) => "ConfigurationError",
            Self::NotFound { .. } => "NotFoundError",
            Self::CorruptSnapshot { .. } => "CorruptSnapshotError",
            Self::InvalidPayload(_) => "InvalidPayloadError",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Record the total number of attempts on a transient error.
    pub(crate) fn with_attempts(self, total: u32) -> Self {
        match self {
            Self::TransientNetwork { url, reason, .. } => Self::TransientNetwork {
                url,
                reason,
                attempts: total,
            },
            other => other,
        }
    }
}
