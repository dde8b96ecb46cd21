//! Ingestion configuration
//!
//! Everything an ingestor needs besides its per-run parameters: where the
//! data lives, which endpoints to call and how patiently to call them.
//! Values come from the environment (a `.env` file is loaded by the binary
//! beforehand) and fall back to the defaults below.

use crate::error::{IngestError, Result};
use crate::fetch::{FetchClient, RetryPolicy};
use crate::store::RawStore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_WEB_API_URL: &str = "https://api.steampowered.com";
pub const DEFAULT_STORE_API_URL: &str = "https://store.steampowered.com/api";
pub const DEFAULT_SPY_API_URL: &str = "https://steamspy.com/api.php";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BASE_MS: u64 = 2_000;
pub const DEFAULT_RETRY_MAX_MS: u64 = 10_000;

/// Environment variable holding the Steam Web API key
pub const API_KEY_ENV: &str = "STEAM_API_KEY";

/// Local, untracked file that may hold the Steam Web API key
pub const API_KEY_FILE: &str = "config/sources/steam_web_api.local.yaml";

/// Source names, used as directory names under `raw/` and `bronze/`
pub mod sources {
    pub const STEAM_WEB: &str = "steam_web";
    pub const STEAM_STORE: &str = "steam_store";
    pub const STEAM_SPY: &str = "steam_spy";
}

/// Fixed on-disk layout below the data root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_root(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn bronze_root(&self) -> PathBuf {
        self.root.join("bronze")
    }

    pub fn raw_store(&self) -> RawStore {
        RawStore::new(self.raw_root())
    }

    /// `<root>/bronze/<source>/<artifact>.parquet`
    pub fn snapshot_path(&self, source_name: &str, artifact_name: &str) -> PathBuf {
        self.bronze_root()
            .join(source_name)
            .join(format!("{}.parquet", artifact_name))
    }

    pub fn app_list_snapshot(&self) -> PathBuf {
        self.snapshot_path(sources::STEAM_WEB, "app_list")
    }

    pub fn app_details_snapshot(&self) -> PathBuf {
        self.snapshot_path(sources::STEAM_STORE, "app_details")
    }

    pub fn spy_snapshot(&self) -> PathBuf {
        self.snapshot_path(sources::STEAM_SPY, "all")
    }
}

/// Base URLs of the upstream services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Steam Web API, e.g. `https://api.steampowered.com`
    pub web_api: String,
    /// Store API, e.g. `https://store.steampowered.com/api`
    pub store_api: String,
    /// Full SteamSpy endpoint URL
    pub spy_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            web_api: DEFAULT_WEB_API_URL.to_string(),
            store_api: DEFAULT_STORE_API_URL.to_string(),
            spy_api: DEFAULT_SPY_API_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// `IStoreService/GetAppList/v1/` on the Web API
    pub fn app_list_url(&self) -> String {
        format!("{}/IStoreService/GetAppList/v1/", self.web_api.trim_end_matches('/'))
    }

    /// `appdetails` on the Store API
    pub fn app_details_url(&self) -> String {
        format!("{}/appdetails", self.store_api.trim_end_matches('/'))
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Data root holding `raw/` and `bronze/`
    pub data_dir: PathBuf,
    pub endpoints: Endpoints,
    /// Per-request timeout in seconds
    pub http_timeout_secs: u64,
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Wait before the first retry, in milliseconds
    pub retry_base_ms: u64,
    /// Upper bound for one backoff wait, in milliseconds
    pub retry_max_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            endpoints: Endpoints::default(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            retry_max_ms: DEFAULT_RETRY_MAX_MS,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self {
            data_dir: PathBuf::from(text("STEAM_ML_DATA_DIR", DEFAULT_DATA_DIR)),
            endpoints: Endpoints {
                web_api: text("STEAM_WEB_API_URL", DEFAULT_WEB_API_URL),
                store_api: text("STEAM_STORE_API_URL", DEFAULT_STORE_API_URL),
                spy_api: text("STEAM_SPY_API_URL", DEFAULT_SPY_API_URL),
            },
            http_timeout_secs: parsed(
                &lookup,
                "STEAM_ML_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?,
            max_attempts: parsed(&lookup, "STEAM_ML_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            retry_base_ms: parsed(&lookup, "STEAM_ML_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)?,
            retry_max_ms: parsed(&lookup, "STEAM_ML_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            return Err(IngestError::config(
                "STEAM_ML_HTTP_TIMEOUT_SECS must be greater than 0",
            ));
        }
        if self.max_attempts == 0 {
            return Err(IngestError::config("STEAM_ML_MAX_ATTEMPTS must be at least 1"));
        }
        if self.retry_base_ms > self.retry_max_ms {
            return Err(IngestError::config(
                "STEAM_ML_RETRY_BASE_MS must not exceed STEAM_ML_RETRY_MAX_MS",
            ));
        }
        for (name, url) in [
            ("STEAM_WEB_API_URL", &self.endpoints.web_api),
            ("STEAM_STORE_API_URL", &self.endpoints.store_api),
            ("STEAM_SPY_API_URL", &self.endpoints.spy_api),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(IngestError::config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }
        Ok(())
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            ..RetryPolicy::default()
        }
    }

    /// HTTP client configured with this timeout and retry policy
    pub fn fetch_client(&self) -> Result<FetchClient> {
        FetchClient::new(self.http_timeout(), self.retry_policy())
    }
}

fn parsed<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            IngestError::config(format!("invalid {} '{}': {}", name, raw, e))
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ApiKeyFile {
    auth: Option<AuthSection>,
}

#[derive(Debug, Deserialize)]
struct AuthSection {
    api_key: Option<String>,
}

/// Read `auth.api_key` from a YAML file. A missing file yields `None`.
pub fn api_key_from_file(path: &Path) -> Result<Option<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(IngestError::config(format!(
                "cannot read '{}': {}",
                path.display(),
                e
            )))
        },
    };

    let file: ApiKeyFile = serde_yaml::from_str(&content).map_err(|e| {
        IngestError::config(format!("invalid YAML in '{}': {}", path.display(), e))
    })?;

    Ok(file
        .auth
        .and_then(|auth| auth.api_key)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty()))
}

/// Resolve the Steam Web API key.
///
/// Order: `explicit`, then `STEAM_API_KEY`, then `auth.api_key` in
/// `key_file`.
pub fn resolve_api_key(explicit: Option<&str>, key_file: &Path) -> Result<String> {
    let from_env = std::env::var(API_KEY_ENV).ok();
    let direct = explicit
        .map(str::to_string)
        .or(from_env)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());

    if let Some(key) = direct {
        return Ok(key);
    }

    api_key_from_file(key_file)?.ok_or_else(|| {
        IngestError::config(format!(
            "no Steam Web API key: pass --api-key, set {} or add auth.api_key to {}",
            API_KEY_ENV,
            key_file.display()
        ))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = IngestConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.http_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_environment_overrides() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("STEAM_ML_DATA_DIR", "/srv/steam"),
            ("STEAM_STORE_API_URL", "http://localhost:9000/api/"),
            ("STEAM_ML_MAX_ATTEMPTS", "2"),
            ("STEAM_ML_RETRY_BASE_MS", "5"),
            ("STEAM_ML_RETRY_MAX_MS", "20"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/steam"));
        assert_eq!(
            config.endpoints.app_details_url(),
            "http://localhost:9000/api/appdetails"
        );
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(5));
        assert_eq!(policy.max_delay, Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let err = IngestConfig::from_lookup(lookup_from(&[("STEAM_ML_MAX_ATTEMPTS", "many")]))
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");

        let err = IngestConfig::from_lookup(lookup_from(&[("STEAM_ML_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("STEAM_ML_MAX_ATTEMPTS"));

        let err = IngestConfig::from_lookup(lookup_from(&[("STEAM_SPY_API_URL", "steamspy.com")]))
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("data");
        assert_eq!(
            layout.app_list_snapshot(),
            PathBuf::from("data/bronze/steam_web/app_list.parquet")
        );
        assert_eq!(
            layout.app_details_snapshot(),
            PathBuf::from("data/bronze/steam_store/app_details.parquet")
        );
        assert_eq!(layout.spy_snapshot(), PathBuf::from("data/bronze/steam_spy/all.parquet"));
        assert_eq!(
            layout.raw_store().path_for(sources::STEAM_WEB, "app_list"),
            PathBuf::from("data/raw/steam_web/app_list.json")
        );
    }

    #[test]
    fn test_app_list_url() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.app_list_url(),
            "https://api.steampowered.com/IStoreService/GetAppList/v1/"
        );
    }

    #[test]
    fn test_api_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steam_web_api.local.yaml");

        assert_eq!(api_key_from_file(&path).unwrap(), None);

        std::fs::write(&path, "auth:\n  api_key: \"  ABC123 \"\n").unwrap();
        assert_eq!(api_key_from_file(&path).unwrap().as_deref(), Some("ABC123"));

        std::fs::write(&path, "auth:\n  api_key: \"\"\n").unwrap();
        assert_eq!(api_key_from_file(&path).unwrap(), None);

        std::fs::write(&path, "auth: [unclosed").unwrap();
        assert_eq!(api_key_from_file(&path).unwrap_err().kind(), "ConfigurationError");
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let key = resolve_api_key(Some("FROM_CLI"), Path::new("/nonexistent/key.yaml")).unwrap();
        assert_eq!(key, "FROM_CLI");
    }
}
