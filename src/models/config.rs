//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Primary store connection settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Search index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Paging, batching and pacing behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Connection retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides on top of the loaded file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("MONGO_URI").filter(|v| !v.trim().is_empty()) {
            self.store.uri = uri;
        }
        if let Some(dir) = lookup("INDEXER_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("ELASTICSEARCH_URL").filter(|v| !v.trim().is_empty()) {
            self.index.url = url;
        }
        if let Some(name) = lookup("INDEXER_INDEX_NAME").filter(|v| !v.trim().is_empty()) {
            self.index.index_name = name;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.index.url.trim().is_empty() {
            return Err(AppError::validation("index.url is empty"));
        }
        url::Url::parse(&self.index.url)?;
        if self.index.index_name.trim().is_empty() {
            return Err(AppError::validation("index.index_name is empty"));
        }
        if self.index.timeout_secs == 0 {
            return Err(AppError::validation("index.timeout_secs must be > 0"));
        }
        if self.index.connect_timeout_secs == 0 {
            return Err(AppError::validation("index.connect_timeout_secs must be > 0"));
        }
        if self.store.connect_timeout_secs == 0 {
            return Err(AppError::validation("store.connect_timeout_secs must be > 0"));
        }
        if self.store.call_timeout_secs == 0 {
            return Err(AppError::validation("store.call_timeout_secs must be > 0"));
        }
        if self.store.backend == StoreBackend::Mongo {
            if self.store.uri.trim().is_empty() {
                return Err(AppError::validation("store.uri is empty"));
            }
            if self.store.database.trim().is_empty() {
                return Err(AppError::validation("store.database is empty"));
            }
        }
        if self.pipeline.batch_size == 0 {
            return Err(AppError::validation("pipeline.batch_size must be > 0"));
        }
        if self.pipeline.parallelism == 0 {
            return Err(AppError::validation("pipeline.parallelism must be > 0"));
        }
        if self.pipeline.moving_average_window == 0 {
            return Err(AppError::validation(
                "pipeline.moving_average_window must be > 0",
            ));
        }
        if self.pipeline.pacing_floor_ms > self.pipeline.pacing_ceiling_ms {
            return Err(AppError::validation(
                "pipeline.pacing_floor_ms must not exceed pipeline.pacing_ceiling_ms",
            ));
        }
        if !(self.pipeline.pacing_factor.is_finite() && self.pipeline.pacing_factor >= 0.0) {
            return Err(AppError::validation(
                "pipeline.pacing_factor must be a non-negative number",
            ));
        }
        if !(self.pipeline.nearby_radius_m.is_finite() && self.pipeline.nearby_radius_m >= 0.0) {
            return Err(AppError::validation(
                "pipeline.nearby_radius_m must be a non-negative number",
            ));
        }
        if self.pipeline.error_threshold == 0 {
            return Err(AppError::validation("pipeline.error_threshold must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be > 0"));
        }
        Ok(())
    }
}

/// Which primary store implementation to read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Live MongoDB deployment
    #[default]
    Mongo,
    /// Exported collections on disk
    Snapshot,
}

/// Primary store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// MongoDB connection string
    #[serde(default = "defaults::store_uri")]
    pub uri: String,

    #[serde(default = "defaults::store_database")]
    pub database: String,

    /// Directory holding the exported collections
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    /// Timeout for establishing the connection
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout applied to every read
    #[serde(default = "defaults::call_timeout")]
    pub call_timeout_secs: u64,
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            uri: defaults::store_uri(),
            database: defaults::store_database(),
            data_dir: defaults::data_dir(),
            connect_timeout_secs: defaults::connect_timeout(),
            call_timeout_secs: defaults::call_timeout(),
        }
    }
}

/// Search index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the Elasticsearch cluster
    #[serde(default = "defaults::index_url")]
    pub url: String,

    #[serde(default = "defaults::index_name")]
    pub index_name: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::index_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: defaults::index_url(),
            index_name: defaults::index_name(),
            timeout_secs: defaults::index_timeout(),
            connect_timeout_secs: defaults::connect_timeout(),
            user_agent: defaults::user_agent(),
        }
    }
}

/// Paging, batching and pacing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Documents per bulk request
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Batches run concurrently per page
    #[serde(default = "defaults::parallelism")]
    pub parallelism: usize,

    /// Batch timings kept for the moving average
    #[serde(default = "defaults::moving_average_window")]
    pub moving_average_window: usize,

    #[serde(default = "defaults::pacing_floor")]
    pub pacing_floor_ms: u64,

    #[serde(default = "defaults::pacing_ceiling")]
    pub pacing_ceiling_ms: u64,

    /// Multiplier applied to the average batch time
    #[serde(default = "defaults::pacing_factor")]
    pub pacing_factor: f64,

    /// Radius within which a pharmacy counts as nearby
    #[serde(default = "defaults::nearby_radius")]
    pub nearby_radius_m: f64,

    /// Nearby pharmacies kept per hospital, closest first
    #[serde(default = "defaults::nearby_limit")]
    pub nearby_limit: usize,

    /// Seconds without a successful page before the connection is rechecked
    #[serde(default = "defaults::stale_after")]
    pub stale_after_secs: u64,

    /// Consecutive page failures before cooling down
    #[serde(default = "defaults::error_threshold")]
    pub error_threshold: u32,

    #[serde(default = "defaults::cooldown")]
    pub cooldown_secs: u64,
}

impl PipelineConfig {
    pub fn page_size(&self) -> usize {
        self.batch_size.saturating_mul(self.parallelism)
    }

    pub fn pacing_floor(&self) -> Duration {
        Duration::from_millis(self.pacing_floor_ms)
    }

    pub fn pacing_ceiling(&self) -> Duration {
        Duration::from_millis(self.pacing_ceiling_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            parallelism: defaults::parallelism(),
            moving_average_window: defaults::moving_average_window(),
            pacing_floor_ms: defaults::pacing_floor(),
            pacing_ceiling_ms: defaults::pacing_ceiling(),
            pacing_factor: defaults::pacing_factor(),
            nearby_radius_m: defaults::nearby_radius(),
            nearby_limit: defaults::nearby_limit(),
            stale_after_secs: defaults::stale_after(),
            error_threshold: defaults::error_threshold(),
            cooldown_secs: defaults::cooldown(),
        }
    }
}

/// Backoff growth between connection attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// `base × attempt`
    #[default]
    Linear,
    /// `base × 2^(attempt - 1)`
    Exponential,
}

/// Connection retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_secs: u64,

    #[serde(default)]
    pub backoff: BackoffKind,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_secs: defaults::base_delay(),
            backoff: BackoffKind::default(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Report progress after every page
    #[serde(default = "defaults::show_progress")]
    pub show_progress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            show_progress: defaults::show_progress(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Store defaults
    pub fn store_uri() -> String {
        "mongodb://127.0.0.1:27017".into()
    }
    pub fn store_database() -> String {
        "horoscope_db".into()
    }
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data/export")
    }
    pub fn connect_timeout() -> u64 {
        300
    }
    pub fn call_timeout() -> u64 {
        300
    }

    // Index defaults
    pub fn index_url() -> String {
        "http://127.0.0.1:9200".into()
    }
    pub fn index_name() -> String {
        "hospitals".into()
    }
    pub fn index_timeout() -> u64 {
        120
    }
    pub fn user_agent() -> String {
        "hospital-indexer/0.1".into()
    }

    // Pipeline defaults
    pub fn batch_size() -> usize {
        500
    }
    pub fn parallelism() -> usize {
        5
    }
    pub fn moving_average_window() -> usize {
        5
    }
    pub fn pacing_floor() -> u64 {
        1_000
    }
    pub fn pacing_ceiling() -> u64 {
        5_000
    }
    pub fn pacing_factor() -> f64 {
        1.0
    }
    pub fn nearby_radius() -> f64 {
        crate::utils::geo::NEARBY_RADIUS_M
    }
    pub fn nearby_limit() -> usize {
        50
    }
    pub fn stale_after() -> u64 {
        300
    }
    pub fn error_threshold() -> u32 {
        3
    }
    pub fn cooldown() -> u64 {
        30
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        10
    }
    pub fn base_delay() -> u64 {
        15
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn show_progress() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.pipeline.page_size(), 2_500);
        assert_eq!(config.pipeline.pacing_floor(), Duration::from_secs(1));
        assert_eq!(config.pipeline.pacing_ceiling(), Duration::from_secs(5));
        assert_eq!(config.pipeline.stale_after(), Duration::from_secs(300));
        assert_eq!(config.pipeline.cooldown(), Duration::from_secs(30));
        assert_eq!(config.pipeline.nearby_radius_m, 100_000.0);
        assert_eq!(config.retry.backoff, BackoffKind::Linear);
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_pacing_bounds() {
        let mut config = Config::default();
        config.pipeline.pacing_floor_ms = 6_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_connect_timeouts() {
        let mut config = Config::default();
        config.store.connect_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.connect_timeout_secs"));

        let mut config = Config::default();
        config.index.connect_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("index.connect_timeout_secs"));
    }

    #[test]
    fn validate_mongo_requires_uri_and_database() {
        let mut config = Config::default();
        config.store.database = " ".into();
        assert!(config.validate().is_err());

        // The snapshot backend does not read either
        config.store.backend = StoreBackend::Snapshot;
        config.store.uri = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = Config::default();
        config.index.url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            batch_size = 100

            [retry]
            backoff = "exponential"

            [store]
            backend = "snapshot"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Snapshot);
        assert_eq!(config.store.database, "horoscope_db");

        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.parallelism, 5);
        assert_eq!(config.retry.backoff, BackoffKind::Exponential);
        assert_eq!(config.index.index_name, "hospitals");
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "ELASTICSEARCH_URL" => Some("http://search:9200".into()),
            "MONGO_URI" => Some("mongodb://db.internal:27017/?replicaSet=rs0".into()),
            "INDEXER_DATA_DIR" => Some("/srv/export".into()),
            "INDEXER_INDEX_NAME" => Some("  ".into()),
            _ => None,
        });

        assert_eq!(config.index.url, "http://search:9200");
        assert_eq!(config.store.data_dir, PathBuf::from("/srv/export"));
        assert_eq!(config.store.uri, "mongodb://db.internal:27017/?replicaSet=rs0");
        assert_eq!(config.index.index_name, "hospitals");
    }
}
