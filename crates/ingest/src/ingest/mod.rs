//! Ingest module — per-file pipeline from blob to persisted batches.
//!
//! - `orchestrator.rs`: [`Ingestor`], buffered / streaming / auto modes
//! - `sink.rs`: [`BatchSink`] and the [`BatchPersister`] seam
//! - `progress.rs`: monotonic progress reporting
//! - `error.rs`: [`IngestError`]
//! - `metrics.rs`: shared atomic counters

pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod sink;

pub use error::IngestError;
pub use metrics::{IngestMetrics, MetricsSnapshot};
pub use orchestrator::{IngestMode, IngestReport, IngestRequest, Ingestor};
pub use progress::{ProgressFn, ProgressTracker};
pub use sink::{BatchPersister, BatchSink, MemoryPersister, PersistError, PersistFuture};
