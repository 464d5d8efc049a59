use super::{http_client, join_url, FetchError};
use serde::Deserialize;

/// Fee rate curve from a whatthefee.io-compatible estimator: a table of
/// values with one row per confirmation-target index entry and one column
/// per confidence percentile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeerateEstimation {
    pub index: Vec<i64>,
    pub columns: Vec<String>,
    pub data: Vec<Vec<i64>>,
}

impl FeerateEstimation {
    /// Rows must line up with the index, and every row with the columns.
    fn validate(&self) -> Result<(), FetchError> {
        if self.data.len() != self.index.len() {
            return Err(FetchError::Malformed(format!(
                "{} data rows for {} index entries",
                self.data.len(),
                self.index.len()
            )));
        }
        if let Some(row) = self.data.iter().find(|r| r.len() != self.columns.len()) {
            return Err(FetchError::Malformed(format!(
                "row of width {} for {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }
}

/// Fetch the current fee rate curve. One shot, no retries.
pub async fn fetch(api_base_url: &str) -> Result<FeerateEstimation, FetchError> {
    if api_base_url.is_empty() {
        return Err(FetchError::MissingBaseUrl);
    }

    // Cache buster, same as the upstream site uses
    let url = join_url(
        api_base_url,
        &format!("data.json?c={}", chrono::Utc::now().timestamp()),
    );
    let resp = http_client()?
        .get(&url)
        .send()
        .await
        .map_err(FetchError::Transport)?;

    if !resp.status().is_success() {
        return Err(FetchError::Upstream(resp.status()));
    }

    let estimation: FeerateEstimation = resp.json().await.map_err(FetchError::Decode)?;
    estimation.validate()?;
    Ok(estimation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeerateEstimation {
        FeerateEstimation {
            index: vec![1, 2],
            columns: vec!["p10".to_string(), "p50".to_string()],
            data: vec![vec![5, 10], vec![8, 15]],
        }
    }

    #[tokio::test]
    async fn test_empty_base_url_rejected() {
        let err = fetch("").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingBaseUrl));
    }

    #[test]
    fn test_decode_estimation() {
        let estimation: FeerateEstimation = serde_json::from_str(
            r#"{"index":[1,2],"columns":["p10","p50"],"data":[[5,10],[8,15]]}"#,
        )
        .unwrap();
        assert_eq!(estimation, sample());
        assert!(estimation.validate().is_ok());
    }

    #[test]
    fn test_validate_row_count_mismatch() {
        let mut estimation = sample();
        estimation.data.pop();
        let err = estimation.validate().unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn test_validate_row_width_mismatch() {
        let mut estimation = sample();
        estimation.data[1] = vec![8];
        let err = estimation.validate().unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }
}
