use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

use crate::parser::Dialect;

/// Forces the wrapped counters onto their own cache line, so files
/// running on different workers don't contend on one line.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Per-file outcomes
#[derive(Debug, Default)]
pub struct FileMetrics {
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

/// Volume counters (updated once per finished file)
#[derive(Debug, Default)]
pub struct VolumeMetrics {
    pub lines: AtomicU64,
    pub entries: AtomicU64,
    pub batches: AtomicU64,
    pub bytes: AtomicU64,
    pub skipped_rows: AtomicU64,
    pub truncated_lines: AtomicU64,
    pub dropped_payload_lines: AtomicU64,
}

/// Files seen per detected dialect
#[derive(Debug, Default)]
pub struct DialectMetrics {
    pub bracketed_log: AtomicU64,
    pub csv_structured: AtomicU64,
    pub call_trace_export: AtomicU64,
}

/// Blob retrieval
#[derive(Debug, Default)]
pub struct RetrievalMetrics {
    /// Attempts that failed transiently and were retried
    pub retries: AtomicU64,
}

/// Counters shared by every ingestion running on one `Ingestor`.
///
/// All operations use `Ordering::Relaxed`; a snapshot is not transactional
/// across fields.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    pub files: CacheAligned<FileMetrics>,
    pub volume: CacheAligned<VolumeMetrics>,
    pub dialects: CacheAligned<DialectMetrics>,
    pub retrieval: CacheAligned<RetrievalMetrics>,
}

/// What a finished (or cancelled) file contributed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileVolume {
    pub lines: u64,
    pub entries: u64,
    pub batches: u64,
    pub bytes: u64,
    pub skipped_rows: u64,
    pub truncated_lines: u64,
    pub dropped_payload_lines: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_started(&self) {
        self.files.0.started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_completed(&self) {
        self.files.0.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.files.0.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cancelled(&self) {
        self.files.0.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.retrieval.0.retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dialect(&self, dialect: Dialect) {
        let counter = match dialect {
            Dialect::BracketedLog => &self.dialects.0.bracketed_log,
            Dialect::CsvStructured => &self.dialects.0.csv_structured,
            Dialect::CallTraceExport => &self.dialects.0.call_trace_export,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_volume(&self, volume: FileVolume) {
        let v = &self.volume.0;
        v.lines.fetch_add(volume.lines, Ordering::Relaxed);
        v.entries.fetch_add(volume.entries, Ordering::Relaxed);
        v.batches.fetch_add(volume.batches, Ordering::Relaxed);
        v.bytes.fetch_add(volume.bytes, Ordering::Relaxed);
        v.skipped_rows.fetch_add(volume.skipped_rows, Ordering::Relaxed);
        v.truncated_lines.fetch_add(volume.truncated_lines, Ordering::Relaxed);
        v.dropped_payload_lines.fetch_add(volume.dropped_payload_lines, Ordering::Relaxed);
    }

    // --- Snapshot Export ---

    pub fn snapshot(&self) -> MetricsSnapshot {
        let files = &self.files.0;
        let volume = &self.volume.0;
        let dialects = &self.dialects.0;

        MetricsSnapshot {
            files_started: files.started.load(Ordering::Relaxed),
            files_completed: files.completed.load(Ordering::Relaxed),
            files_failed: files.failed.load(Ordering::Relaxed),
            files_cancelled: files.cancelled.load(Ordering::Relaxed),

            lines: volume.lines.load(Ordering::Relaxed),
            entries: volume.entries.load(Ordering::Relaxed),
            batches: volume.batches.load(Ordering::Relaxed),
            bytes: volume.bytes.load(Ordering::Relaxed),
            skipped_rows: volume.skipped_rows.load(Ordering::Relaxed),
            truncated_lines: volume.truncated_lines.load(Ordering::Relaxed),
            dropped_payload_lines: volume.dropped_payload_lines.load(Ordering::Relaxed),

            bracketed_log_files: dialects.bracketed_log.load(Ordering::Relaxed),
            csv_structured_files: dialects.csv_structured.load(Ordering::Relaxed),
            call_trace_files: dialects.call_trace_export.load(Ordering::Relaxed),

            retries: self.retrieval.0.retries.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time view of [`IngestMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub files_started: u64,
    pub files_completed: u64,
    pub files_failed: u64,
    pub files_cancelled: u64,

    pub lines: u64,
    pub entries: u64,
    pub batches: u64,
    pub bytes: u64,
    pub skipped_rows: u64,
    pub truncated_lines: u64,
    pub dropped_payload_lines: u64,

    pub bracketed_log_files: u64,
    pub csv_structured_files: u64,
    pub call_trace_files: u64,

    pub retries: u64,
}

impl MetricsSnapshot {
    /// Files that have started but not reached an outcome yet.
    pub fn in_flight(&self) -> u64 {
        self.files_started
            .saturating_sub(self.files_completed + self.files_failed + self.files_cancelled)
    }
}
