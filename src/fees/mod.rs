pub mod mempoolspace;
pub mod whatthefee;

use std::time::Duration;
use thiserror::Error;

/// Failure modes for a fee snapshot fetch.
///
/// Either provider failing aborts the whole run: policy scripts need both
/// snapshots, and there is no retry.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("API base URL is not set")]
    MissingBaseUrl,
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status code {0}")]
    Upstream(reqwest::StatusCode),
    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn http_client() -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(FetchError::Transport)
}

/// Join `path` onto `base`, tolerating a missing trailing slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
