//! steam-ml Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the steam-ml workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and its result alias
//! - **Checksums**: SHA-256 digests for raw payload audit trails
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Types**: the tagged [`Scalar`](types::Scalar) record model used by the
//!   columnar snapshots
//!
//! # Example
//!
//! ```no_run
//! use steam_ml_common::types::{Record, Scalar};
//!
//! let mut record = Record::new();
//! record.insert("appid".to_string(), Scalar::Int(570));
//! record.insert("name".to_string(), Scalar::from("Dota 2"));
//! assert_eq!(record.len(), 2);
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
