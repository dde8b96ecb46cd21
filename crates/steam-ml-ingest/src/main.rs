//! steam-ml-ingest - Steam data ingestion tool

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use steam_ml_common::logging::{init_logging, LogConfig, LogLevel};
use steam_ml_ingest::config::{resolve_api_key, IngestConfig, API_KEY_FILE};
use steam_ml_ingest::steam_spy::SpyIngestor;
use steam_ml_ingest::steam_store::{AppDetailsIngestor, DetailRunRequest, DEFAULT_LIMIT};
use steam_ml_ingest::steam_web::{AppListIngestor, DEFAULT_PAGE_SIZE};
use steam_ml_ingest::{IngestError, Result};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "steam-ml-ingest")]
#[command(author, version, about = "Steam data ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Data root holding raw/ and bronze/ (overrides STEAM_ML_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the full app catalog from the Steam Web API
    AppList {
        /// Apps per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,

        /// Leave DLC out of the catalog
        #[arg(long)]
        no_dlc: bool,

        /// Steam Web API key
        #[arg(long, env = "STEAM_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Fetch store details for catalog apps that have none yet
    AppDetails {
        /// Catalog snapshot (defaults to the one under the data root)
        #[arg(long)]
        app_list_parquet: Option<PathBuf>,

        /// Most apps to fetch in this run
        #[arg(long, default_value_t = DEFAULT_LIMIT, conflicts_with = "all")]
        limit: usize,

        /// Fetch every app that has no details yet
        #[arg(long)]
        all: bool,

        /// Seconds to wait between requests
        #[arg(long, default_value_t = 0.3)]
        request_delay: f64,

        /// Store country code, affects prices and availability
        #[arg(long, default_value = "us")]
        cc: String,

        /// Store language
        #[arg(long, default_value = "english")]
        language: String,
    },

    /// Fetch the SteamSpy `all` dataset
    SpyAll,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("steam-ml-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The binary should work without logging
    let guard = init_logging(&log_config).ok();

    let code = match execute(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Ingest failed");
            eprintln!("Error [{}]: {}", e.kind(), e);
            1
        },
    };

    // Flush file logs before exiting
    drop(guard);
    process::exit(code);
}

async fn execute(cli: Cli) -> Result<()> {
    let mut config = IngestConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    match cli.command {
        Command::AppList {
            page_size,
            no_dlc,
            api_key,
        } => {
            let api_key = resolve_api_key(api_key.as_deref(), Path::new(API_KEY_FILE))?;
            let summary = AppListIngestor::from_config(&config, api_key)?
                .run(page_size, !no_dlc)
                .await?;

            println!("Raw payload: {}", summary.raw.path.display());
            println!(
                "Snapshot:    {} ({} apps, {} skipped)",
                summary.snapshot.display(),
                summary.apps,
                summary.skipped
            );
        },
        Command::AppDetails {
            app_list_parquet,
            limit,
            all,
            request_delay,
            cc,
            language,
        } => {
            let request_delay = Duration::try_from_secs_f64(request_delay).map_err(|e| {
                IngestError::config(format!("invalid --request-delay {}: {}", request_delay, e))
            })?;
            let app_list_path =
                app_list_parquet.unwrap_or_else(|| config.layout().app_list_snapshot());

            let request = DetailRunRequest {
                app_list_path,
                limit: (!all).then_some(limit),
                request_delay,
                country_code: cc,
                language,
            };
            info!(?request, "Starting app details ingest");

            let summary = AppDetailsIngestor::from_config(&config)?.run(&request).await?;
            if summary.is_complete() {
                println!("Nothing to fetch: every catalog app already has details");
                return Ok(());
            }
            if summary.is_noop() {
                println!(
                    "Nothing fetched: batch limit is 0 ({} apps still without details)",
                    summary.frontier_size
                );
                return Ok(());
            }

            println!(
                "Fetched {} of {} remaining apps ({} without store data, {} deferred)",
                summary.batch.len() - summary.deferred.len(),
                summary.frontier_size,
                summary.unavailable,
                summary.deferred.len()
            );
            if let Some(raw) = &summary.raw {
                println!("Raw payload: {}", raw.path.display());
            }
            if let Some(merge) = summary.merge {
                println!(
                    "Snapshot:    {} ({} rows, {} new, {} updated)",
                    config.layout().app_details_snapshot().display(),
                    merge.total,
                    merge.inserted,
                    merge.updated
                );
            }
        },
        Command::SpyAll => {
            let summary = SpyIngestor::from_config(&config)?.run().await?;

            println!("Raw payload: {}", summary.raw.path.display());
            println!(
                "Snapshot:    {} ({} apps, {} skipped)",
                summary.snapshot.display(),
                summary.apps,
                summary.skipped
            );
        },
    }

    Ok(())
}
