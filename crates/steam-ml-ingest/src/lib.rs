//! steam-ml Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pulls app data from the public Steam services, keeps the raw responses
//! and maintains Parquet snapshots of them (the "bronze" layer).
//!
//! # Supported Data Sources
//!
//! - **Steam Web API**: the full app catalog ([`steam_web`])
//! - **Steam Store API**: per-app store details, fetched incrementally
//!   ([`steam_store`])
//! - **SteamSpy**: owner and playtime estimates for all apps ([`steam_spy`])
//!
//! # Example
//!
//! ```no_run
//! use steam_ml_ingest::config::IngestConfig;
//! use steam_ml_ingest::steam_store::{AppDetailsIngestor, DetailRunRequest};
//!
//! #[tokio::main]
//! async fn main() -> steam_ml_ingest::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let request = DetailRunRequest::new(config.layout().app_list_snapshot());
//!
//!     let summary = AppDetailsIngestor::from_config(&config)?.run(&request).await?;
//!     println!("fetched {} apps", summary.fetched);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod progress;
pub mod steam_spy;
pub mod steam_store;
pub mod steam_web;
pub mod store;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
