use super::{http_client, join_url, FetchError};
use serde::Deserialize;

/// Recommended fee rates from a mempool.space-compatible estimator, in
/// sat/vB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedFees {
    pub fastest_fee: u64,
    pub half_hour_fee: u64,
    pub hour_fee: u64,
    pub economy_fee: u64,
    pub minimum_fee: u64,
}

/// Fetch the current recommended fees. One shot, no retries.
pub async fn fetch(api_base_url: &str) -> Result<RecommendedFees, FetchError> {
    if api_base_url.is_empty() {
        return Err(FetchError::MissingBaseUrl);
    }

    let url = join_url(api_base_url, "fees/recommended");
    let resp = http_client()?
        .get(&url)
        .send()
        .await
        .map_err(FetchError::Transport)?;

    if !resp.status().is_success() {
        return Err(FetchError::Upstream(resp.status()));
    }

    resp.json().await.map_err(FetchError::Decode)
}
