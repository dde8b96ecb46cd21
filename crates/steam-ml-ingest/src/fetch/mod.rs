//! Resilient HTTP fetching: timeout, retry and backoff around `reqwest`.

pub mod client;
pub mod retry;

pub use client::{FetchClient, QueryParams, USER_AGENT};
pub use retry::{retrying, RetryPolicy};
