use std::path::PathBuf;

/// Runtime settings, assembled in `main` from CLI flags and environment
/// variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the params SQLite database
    pub database_path: PathBuf,
    /// Base URL of the mempool.space-compatible fee estimator
    pub mempool_api_base_url: String,
    /// Base URL of the whatthefee.io-compatible fee estimator
    pub whatthefee_api_base_url: String,
    /// Interpreter operation budget per script execution
    pub max_script_ops: u64,
    /// Logging level
    pub log_level: String,
}

impl Config {
    /// A run must not reach the store with an incomplete configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mempool_api_base_url.is_empty() {
            anyhow::bail!(
                "mempool API base URL is not set (--mempool-api-base-url / MEMPOOL_API_BASE_URL)"
            );
        }
        if self.whatthefee_api_base_url.is_empty() {
            anyhow::bail!(
                "whatthefee API base URL is not set (--whatthefee-api-base-url / WHATTHEFEE_API_BASE_URL)"
            );
        }
        if self.max_script_ops == 0 {
            anyhow::bail!("max_script_ops must be greater than zero");
        }
        Ok(())
    }

    /// Create a config with all defaults for testing purposes.
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            mempool_api_base_url: "https://mempool.space/api/".to_string(),
            whatthefee_api_base_url: "https://whatthefee.io/".to_string(),
            max_script_ops: 100_000,
            log_level: "info".to_string(),
        }
    }
}
