//! Load — config loading from file and environment variables.

use std::path::Path;
use thiserror::Error;

use super::model::IngestConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl IngestConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("INGEST_CONFIG_FILE")
            .unwrap_or_else(|_| "/etc/ingest/ingest.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using environment variables", config_path);
            Self::default()
        };

        config.apply_env();
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Environment variables override whatever the file (or defaults) provided.
    /// Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("INGEST_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_parse("INGEST_STREAM_THRESHOLD_BYTES") {
            self.stream_threshold_bytes = v;
        }
        if let Some(v) = env_parse("INGEST_MAX_LINE_BYTES") {
            self.max_line_bytes = v;
        }
        if let Some(v) = env_parse("INGEST_MAX_PAYLOAD_BYTES") {
            self.max_payload_bytes = v;
        }
        if let Some(v) = env_parse("INGEST_PROBE_BYTES") {
            self.probe_bytes = v;
        }
        if let Ok(root) = std::env::var("INGEST_BLOB_ROOT") {
            self.blob_root = root;
        }
        if let Some(v) = env_parse("INGEST_MAX_CONCURRENT_FILES") {
            self.max_concurrent_files = v;
        }
        if let Some(v) = env_parse("INGEST_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = v;
        }
        if let Some(v) = env_parse("INGEST_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = v;
        }
        if let Some(v) = env_parse("INGEST_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
