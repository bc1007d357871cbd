//! Model — IngestConfig and related structs.

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::blob::RetryPolicy;
use crate::parser::DEFAULT_MAX_PAYLOAD_BYTES;

pub const DEFAULT_BATCH_SIZE: usize = 250;
pub const DEFAULT_STREAM_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_LINE_BYTES: usize = 1_048_576; // 1MB
pub const DEFAULT_PROBE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Entries per persisted batch
    pub batch_size: usize,
    /// Files whose probed size exceeds this are streamed instead of buffered
    pub stream_threshold_bytes: u64,
    /// Longest line kept; the remainder up to the next newline is dropped
    pub max_line_bytes: usize,
    /// Largest payload kept for one entry; later continuation lines are dropped
    pub max_payload_bytes: usize,
    /// Bytes inspected for dialect detection before parsing starts
    pub probe_bytes: usize,
    /// Root directory for the local blob store used by the binary
    pub blob_root: String,
    pub max_concurrent_files: usize,
    pub retry: RetryConfig,
}

/// Backoff settings for blobs that are not yet visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            stream_threshold_bytes: DEFAULT_STREAM_THRESHOLD_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            probe_bytes: DEFAULT_PROBE_BYTES,
            blob_root: ".".to_string(),
            max_concurrent_files: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    /// Validate retry configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be > 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!(
                "retry.max_delay_ms ({}) must not be below retry.base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            ));
        }
        Ok(())
    }
}

impl IngestConfig {
    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.max_line_bytes == 0 {
            return Err("max_line_bytes must be > 0".to_string());
        }
        if self.max_payload_bytes == 0 {
            return Err("max_payload_bytes must be > 0".to_string());
        }
        if self.probe_bytes == 0 {
            return Err("probe_bytes must be > 0".to_string());
        }
        if self.max_concurrent_files == 0 {
            return Err("max_concurrent_files must be > 0".to_string());
        }
        self.retry.validate()
    }
}
