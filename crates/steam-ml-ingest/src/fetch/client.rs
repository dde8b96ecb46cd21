//! HTTP client shared by every ingestor
//!
//! One `FetchClient` wraps one `reqwest::Client`, so all requests of an
//! ingestor reuse the same connection pool. Responses are classified into
//! transient and permanent failures here; the retry loop lives in
//! [`super::retry`].

use super::retry::{retrying, RetryPolicy};
use crate::error::{IngestError, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Identifying `User-Agent` sent with every request
pub const USER_AGENT: &str = concat!("steam-ml-ingest/", env!("CARGO_PKG_VERSION"));

/// Longest response excerpt kept in a permanent error message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Query parameters of one request
pub type QueryParams = [(&'static str, String)];

pub struct FetchClient {
    client: Client,
    policy: RetryPolicy,
}

impl FetchClient {
    /// Create a client with the given request timeout and retry policy
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client, policy })
    }

    /// GET `url` with `params` and parse the JSON body, retrying transient
    /// failures according to the policy.
    pub async fn fetch(&self, url: &str, params: &QueryParams) -> Result<Value> {
        retrying(&self.policy, url, |_| self.fetch_once(url, params)).await
    }

    /// Single attempt without retry.
    pub async fn fetch_once(&self, url: &str, params: &QueryParams) -> Result<Value> {
        debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| IngestError::transient(url, describe_send_error(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(url, status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IngestError::transient(url, format!("body read failed: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| IngestError::transient(url, format!("malformed JSON body: {}", e)))
    }
}

/// Map a non-success status to the error taxonomy.
fn classify_status(url: &str, status: StatusCode, body: &str) -> IngestError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return IngestError::transient(url, format!("HTTP {}", status));
    }

    let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    IngestError::PermanentRequest {
        url: url.to_string(),
        status: status.as_u16(),
        message: if message.trim().is_empty() {
            status.canonical_reason().unwrap_or("request rejected").to_string()
        } else {
            message
        },
    }
}

/// The query string may carry the API key, so the URL is stripped first.
fn describe_send_error(err: reqwest::Error) -> String {
    let err = err.without_url();
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("request failed: {}", err)
    }
}
