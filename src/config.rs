//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Time-series store session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub token: String,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

fn default_address() -> String {
    "http://localhost:8086".to_string()
}

fn default_query_timeout() -> u64 {
    20
}

fn default_max_concurrent_queries() -> usize {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            org: String::new(),
            bucket: String::new(),
            token: String::new(),
            query_timeout_secs: default_query_timeout(),
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

impl StoreConfig {
    /// Check that every connection setting is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("address", &self.address),
            ("bucket", &self.bucket),
            ("token", &self.token),
            ("org", &self.org),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("store: {} could not be empty", name)));
            }
        }
        if self.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid(
                "store: max_concurrent_queries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// Nothing is logged here; the returned [`LoadReport`] says where the
    /// config came from and which candidates were skipped, so the caller can
    /// log it once a subscriber is installed.
    pub fn load_default() -> (Self, LoadReport) {
        Self::load_first(&Self::default_paths())
    }

    /// Candidate config files, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("sensorflux").join("config.toml")),
            Some(PathBuf::from("/etc/sensorflux/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load the first existing path that parses, falling back to the environment
    pub fn load_first(paths: &[PathBuf]) -> (Self, LoadReport) {
        let mut report = LoadReport::default();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    report.source = Some(path.clone());
                    return (config, report);
                }
                Err(e) => report.skipped.push(e),
            }
        }

        (Self::from_env(), report)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(address) = std::env::var("SENSORFLUX_STORE_ADDRESS") {
            self.store.address = address;
        }
        if let Ok(org) = std::env::var("SENSORFLUX_STORE_ORG") {
            self.store.org = org;
        }
        if let Ok(bucket) = std::env::var("SENSORFLUX_STORE_BUCKET") {
            self.store.bucket = bucket;
        }
        if let Ok(token) = std::env::var("SENSORFLUX_STORE_TOKEN") {
            self.store.token = token;
        }
        if let Ok(timeout) = std::env::var("SENSORFLUX_QUERY_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.store.query_timeout_secs = t;
            }
        }

        if let Ok(level) = std::env::var("SENSORFLUX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SENSORFLUX_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Outcome of searching for a config file
#[derive(Debug, Default)]
pub struct LoadReport {
    /// File the config was read from, `None` for defaults plus environment
    pub source: Option<PathBuf>,
    /// Candidates that exist but could not be loaded
    pub skipped: Vec<ConfigError>,
}

impl LoadReport {
    /// Emit the outcome through `tracing`
    pub fn log(&self) {
        for error in &self.skipped {
            tracing::warn!("Skipping config: {}", error);
        }
        match &self.source {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Sensorflux Configuration
#
# Environment variables override these settings:
# - SENSORFLUX_STORE_ADDRESS
# - SENSORFLUX_STORE_ORG
# - SENSORFLUX_STORE_BUCKET
# - SENSORFLUX_STORE_TOKEN
# - SENSORFLUX_QUERY_TIMEOUT_SECS
# - SENSORFLUX_LOG_LEVEL
# - SENSORFLUX_LOG_FORMAT

[store]
# Time-series store URL
address = "http://localhost:8086"

# Organization that owns the bucket
org = ""

# Bucket queried by sensor requests
bucket = ""

# API token
token = ""

# Deadline for a single query (seconds)
query_timeout_secs = 20

# Queries allowed in flight at once
max_concurrent_queries = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
