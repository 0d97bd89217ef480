use std::env;

use crate::error::SitepulseError;
use crate::safety::mask_key;

/// Application configuration loaded from environment variables.
/// CLI flags may override individual fields after loading; env vars take
/// precedence over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    // Downstream backend
    pub backend_url: String,
    pub backend_api_key: String,

    // Keyword-metrics service (comma-separated mirror endpoints)
    pub trends_api_urls: Vec<String>,

    // Snapshot store
    pub encryption_key: String,
    pub snapshot_dir: String,

    // Sitemap acquisition
    pub sitemap_urls: Vec<String>,
    pub sitemap_workers: usize,
    pub sitemap_rate_limit: f64,
    pub max_urls_per_sitemap: usize,

    // Metrics dispatch
    pub api_workers: usize,
    pub api_rate_limit: f64,
    /// Keywords per metrics-call batch (CLI-level batching).
    pub batch_size: usize,
    /// Records per backend wire batch (internal submission batching).
    pub submit_batch_size: usize,
    /// Forced delay between sequential metrics calls, in milliseconds.
    pub api_call_delay_ms: u64,

    pub debug: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            backend_url: required_env("BACKEND_URL"),
            backend_api_key: required_env("BACKEND_API_KEY"),
            trends_api_urls: split_csv(&required_env("TRENDS_API_URL")),
            encryption_key: required_env("ENCRYPTION_KEY"),
            snapshot_dir: env::var("SNAPSHOT_DIR").unwrap_or_else(|_| "./snapshots".to_string()),
            sitemap_urls: split_csv(&env::var("SITEMAP_URLS").unwrap_or_default()),
            sitemap_workers: parse_env("SITEMAP_WORKERS", 15),
            sitemap_rate_limit: parse_env("SITEMAP_RATE_LIMIT", 30.0),
            max_urls_per_sitemap: parse_env("MAX_URLS_PER_SITEMAP", 100_000),
            api_workers: parse_env("API_WORKERS", 4),
            api_rate_limit: parse_env("API_RATE_LIMIT", 1.0),
            batch_size: parse_env("BATCH_SIZE", 8),
            submit_batch_size: parse_env("SUBMIT_BATCH_SIZE", 300),
            api_call_delay_ms: parse_env("API_CALL_DELAY_MS", 0),
            debug: env::var("DEBUG").map(|v| v == "1" || v == "true").unwrap_or(false),
        }
    }

    /// Check invariants that must hold before any network I/O happens.
    pub fn validate(&self) -> Result<(), SitepulseError> {
        if self.backend_url.is_empty() {
            return Err(SitepulseError::Config("BACKEND_URL is empty".into()));
        }
        if self.backend_api_key.is_empty() {
            return Err(SitepulseError::Config("BACKEND_API_KEY is empty".into()));
        }
        if self.trends_api_urls.is_empty() {
            return Err(SitepulseError::Config("TRENDS_API_URL is empty".into()));
        }
        if self.encryption_key.len() < 16 {
            return Err(SitepulseError::Config(
                "ENCRYPTION_KEY must be at least 16 characters".into(),
            ));
        }
        if self.sitemap_workers == 0 {
            return Err(SitepulseError::Config("SITEMAP_WORKERS must be > 0".into()));
        }
        if self.submit_batch_size == 0 || self.batch_size == 0 {
            return Err(SitepulseError::Config("batch sizes must be > 0".into()));
        }
        Ok(())
    }

    /// Log the shape of each sensitive value for debugging, never the value.
    pub fn log_redacted(&self) {
        tracing::info!("BACKEND_URL = {}", mask_key(&self.backend_url));
        tracing::info!("BACKEND_API_KEY = {}", mask_key(&self.backend_api_key));
        tracing::info!("TRENDS_API_URL = {} endpoints", self.trends_api_urls.len());
        tracing::info!("ENCRYPTION_KEY = {}", mask_key(&self.encryption_key));
        tracing::info!(
            "SITEMAP_URLS = {} sites, workers = {}",
            self.sitemap_urls.len(),
            self.sitemap_workers
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            backend_url: "https://backend.test".into(),
            backend_api_key: "key".into(),
            trends_api_urls: vec!["https://metrics.test".into()],
            encryption_key: "0123456789abcdef".into(),
            snapshot_dir: "./snapshots".into(),
            sitemap_urls: vec![],
            sitemap_workers: 15,
            sitemap_rate_limit: 30.0,
            max_urls_per_sitemap: 100_000,
            api_workers: 4,
            api_rate_limit: 1.0,
            batch_size: 8,
            submit_batch_size: 300,
            api_call_delay_ms: 0,
            debug: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn short_encryption_key_rejected() {
        let mut cfg = base_config();
        cfg.encryption_key = "too-short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn csv_splitting() {
        assert_eq!(
            split_csv("https://a.test, https://b.test ,,"),
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );
        assert!(split_csv("").is_empty());
    }
}
