//! Conf module — configuration model, loading and validation.

pub mod model;
pub mod load;

pub use model::{IngestConfig, RetryConfig};
pub use load::ConfigError;
