//! Orchestrator — one file from blob reference to persisted batches.
//!
//! Both modes share one per-file cursor (builder → enricher → seal → sink).
//! They differ only in how lines reach it: split eagerly from a fully
//! buffered body, or reassembled from a live stream.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blob::{BlobError, BlobRef, BlobStore, ByteStream, OpenedStream, RetrievalError, RetryingByteSource};
use crate::conf::IngestConfig;
use crate::correlate::CorrelationEnricher;
use crate::parser::{
    split_lines, Dialect, DialectBuilder, DialectDetector, EntryBuilder, EntryContext, LineReassembler, LogEntry,
};

use super::error::IngestError;
use super::metrics::{FileVolume, IngestMetrics};
use super::progress::{ProgressFn, ProgressTracker};
use super::sink::{BatchPersister, BatchSink, PersistError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    Buffered,
    Streaming,
}

/// One file to ingest and how to report on it.
#[derive(Clone)]
pub struct IngestRequest {
    pub blob: BlobRef,
    /// Human-readable file name, stamped on every entry as `sourceFile`
    pub label: String,
    /// Caller tag stamped on every entry as `sourceTag`
    pub tag: String,
    /// Overrides the configured batch size for this file
    pub batch_size: Option<usize>,
    pub on_progress: Option<ProgressFn>,
    pub cancel: CancellationToken,
}

impl IngestRequest {
    pub fn new(blob: impl Into<BlobRef>, label: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            blob: blob.into(),
            label: label.into(),
            tag: tag.into(),
            batch_size: None,
            on_progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_progress(mut self, on_progress: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Name used for extension-based detection: the label when it has an
    /// extension, otherwise the blob reference.
    fn detection_name(&self) -> &str {
        if self.label.contains('.') {
            &self.label
        } else {
            self.blob.as_str()
        }
    }
}

/// Outcome of one successful or cancelled ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub file: String,
    pub dialect: Dialect,
    pub mode: IngestMode,
    /// Entries committed by the persister
    pub entries: u64,
    pub batches: u64,
    pub lines: u64,
    pub bytes: u64,
    pub skipped_rows: u64,
    pub truncated_lines: u64,
    /// Continuation lines refused because an entry's payload was full
    pub dropped_payload_lines: u64,
    pub cancelled: bool,
}

impl IngestReport {
    /// Report for a file cancelled before any of its bytes were read.
    fn unread(request: &IngestRequest, mode: IngestMode) -> Self {
        Self {
            file: request.label.clone(),
            dialect: DialectDetector::detect(request.detection_name(), &[]),
            mode,
            entries: 0,
            batches: 0,
            lines: 0,
            bytes: 0,
            skipped_rows: 0,
            truncated_lines: 0,
            dropped_payload_lines: 0,
            cancelled: true,
        }
    }
}

/// Drives ingestions against one blob store. Cheap to share: every call
/// builds its own cursor, so independent files can run concurrently.
pub struct Ingestor {
    source: RetryingByteSource,
    config: IngestConfig,
    enricher: CorrelationEnricher,
    metrics: Arc<IngestMetrics>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn BlobStore>, config: IngestConfig) -> Self {
        let metrics = Arc::new(IngestMetrics::new());
        let source = RetryingByteSource::new(store, config.retry.policy()).with_metrics(Arc::clone(&metrics));
        Self {
            source,
            config,
            enricher: CorrelationEnricher::new(),
            metrics,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Pick the mode from the probed size: buffered at or below the stream
    /// threshold, streaming above it or when the size is unknown. The probe
    /// waits out a not-found window like a read would.
    pub async fn ingest_file<P: BatchPersister>(
        &self,
        request: IngestRequest,
        persister: P,
    ) -> Result<IngestReport, IngestError> {
        let size = match self.source.resolve_size(&request.blob, &request.cancel).await {
            Ok(size) => size,
            Err(RetrievalError::Cancelled { .. }) => {
                self.metrics.record_started();
                return self.settle(&request, Ok(IngestReport::unread(&request, IngestMode::Streaming)));
            }
            Err(source) => {
                self.metrics.record_started();
                let failed = Err(IngestError::Retrieval { file: request.label.clone(), source });
                return self.settle(&request, failed);
            }
        };

        match size {
            Some(size) if size <= self.config.stream_threshold_bytes => self.ingest(request, persister).await,
            size => {
                debug!(file = %request.label, ?size, "streaming ingestion selected");
                self.ingest_incremental(request, persister).await
            }
        }
    }

    /// Buffered mode: fetch the whole blob, then parse it at once.
    pub async fn ingest<P: BatchPersister>(
        &self,
        request: IngestRequest,
        persister: P,
    ) -> Result<IngestReport, IngestError> {
        self.metrics.record_started();
        let result = self.run_buffered(&request, persister).await;
        self.settle(&request, result)
    }

    /// Streaming mode: lines are reassembled as chunks arrive, so memory
    /// stays bounded by one line plus one batch.
    pub async fn ingest_incremental<P: BatchPersister>(
        &self,
        request: IngestRequest,
        persister: P,
    ) -> Result<IngestReport, IngestError> {
        self.metrics.record_started();
        let result = self.run_streaming(&request, persister).await;
        self.settle(&request, result)
    }

    async fn run_buffered<P: BatchPersister>(
        &self,
        request: &IngestRequest,
        persister: P,
    ) -> Result<IngestReport, IngestError> {
        let body = match self.source.fetch_all(&request.blob, &request.cancel).await {
            Ok(body) => body,
            Err(RetrievalError::Cancelled { .. }) => return Ok(IngestReport::unread(request, IngestMode::Buffered)),
            Err(source) => return Err(IngestError::Retrieval { file: request.label.clone(), source }),
        };

        let probe = &body[..body.len().min(self.config.probe_bytes)];
        let dialect = DialectDetector::detect(request.detection_name(), probe);
        let text = String::from_utf8_lossy(&body);
        let mut split = split_lines(&text, self.config.max_line_bytes);
        let lines: Vec<&str> = split.by_ref().collect();
        let truncated = split.truncated();

        info!(file = %request.label, dialect = dialect.as_str(), bytes = body.len(), lines = lines.len(), "Ingesting buffered");

        let mut run = self.cursor(request, dialect, IngestMode::Buffered, persister);
        run.bytes = body.len() as u64;
        run.truncated_lines = truncated;
        let mut progress = ProgressTracker::new(request.on_progress.clone(), Some(lines.len() as u64));

        for (position, line) in lines.iter().enumerate() {
            if request.cancel.is_cancelled() {
                return Ok(run.report(true));
            }
            run.push_line(line).await?;
            progress.update(position as u64 + 1);
        }

        run.finish().await?;
        progress.complete();
        Ok(run.report(false))
    }

    async fn run_streaming<P: BatchPersister>(
        &self,
        request: &IngestRequest,
        persister: P,
    ) -> Result<IngestReport, IngestError> {
        let OpenedStream { mut stream, size_hint } = match self.source.open_stream(&request.blob, &request.cancel).await {
            Ok(opened) => opened,
            Err(RetrievalError::Cancelled { .. }) => return Ok(IngestReport::unread(request, IngestMode::Streaming)),
            Err(source) => return Err(IngestError::Retrieval { file: request.label.clone(), source }),
        };

        // Hold back the first chunks until the probe window is full, then
        // replay them into the reassembler.
        let mut probe: Vec<u8> = Vec::new();
        let mut ended = false;
        let mut cancelled = false;
        while probe.len() < self.config.probe_bytes {
            match next_chunk(&mut stream, &request.cancel).await {
                Next::Chunk(chunk) => probe.extend_from_slice(&chunk),
                Next::End => {
                    ended = true;
                    break;
                }
                Next::Cancelled => {
                    cancelled = true;
                    break;
                }
                Next::Failed(source) => {
                    return Err(IngestError::StreamInterrupted {
                        file: request.label.clone(),
                        offset: probe.len() as u64,
                        committed: 0,
                        source,
                    });
                }
            }
        }

        let window = &probe[..probe.len().min(self.config.probe_bytes)];
        let dialect = DialectDetector::detect(request.detection_name(), window);
        info!(file = %request.label, dialect = dialect.as_str(), size = ?size_hint, "Ingesting streamed");

        let mut run = self.cursor(request, dialect, IngestMode::Streaming, persister);
        if cancelled {
            return Ok(run.report(true));
        }

        let mut reassembler = LineReassembler::new(self.config.max_line_bytes);
        let mut progress = ProgressTracker::new(request.on_progress.clone(), size_hint);

        let lines = reassembler.feed(&probe);
        drop(probe);
        if run.push_lines(lines, &request.cancel).await? == Flow::Cancelled {
            return Ok(run.report_streamed(&reassembler, true));
        }
        progress.update(reassembler.bytes_seen());

        while !ended {
            match next_chunk(&mut stream, &request.cancel).await {
                Next::Chunk(chunk) => {
                    let lines = reassembler.feed(&chunk);
                    if run.push_lines(lines, &request.cancel).await? == Flow::Cancelled {
                        return Ok(run.report_streamed(&reassembler, true));
                    }
                    progress.update(reassembler.bytes_seen());
                }
                Next::End => ended = true,
                Next::Cancelled => return Ok(run.report_streamed(&reassembler, true)),
                Next::Failed(source) => {
                    return Err(IngestError::StreamInterrupted {
                        file: request.label.clone(),
                        offset: reassembler.bytes_seen(),
                        committed: run.sink.committed(),
                        source,
                    });
                }
            }
        }

        if let Some(line) = reassembler.flush() {
            run.push_line(&line).await?;
        }
        run.finish().await?;
        progress.complete();
        Ok(run.report_streamed(&reassembler, false))
    }

    fn cursor<'a, P: BatchPersister>(
        &'a self,
        request: &'a IngestRequest,
        dialect: Dialect,
        mode: IngestMode,
        persister: P,
    ) -> FileCursor<'a, P> {
        let ctx = EntryContext::new(&request.label, &request.tag);
        let batch_size = request.batch_size.unwrap_or(self.config.batch_size);
        self.metrics.record_dialect(dialect);
        FileCursor {
            file: &request.label,
            dialect,
            mode,
            builder: DialectBuilder::new(dialect, ctx, self.config.max_payload_bytes),
            sink: BatchSink::new(persister, batch_size),
            enricher: &self.enricher,
            lines: 0,
            bytes: 0,
            truncated_lines: 0,
        }
    }

    /// Count the file's outcome, then hand the result back.
    fn settle(
        &self,
        request: &IngestRequest,
        result: Result<IngestReport, IngestError>,
    ) -> Result<IngestReport, IngestError> {
        match &result {
            Ok(report) => {
                self.metrics.record_volume(FileVolume {
                    lines: report.lines,
                    entries: report.entries,
                    batches: report.batches,
                    bytes: report.bytes,
                    skipped_rows: report.skipped_rows,
                    truncated_lines: report.truncated_lines,
                    dropped_payload_lines: report.dropped_payload_lines,
                });
                if report.cancelled {
                    self.metrics.record_cancelled();
                    info!(file = %report.file, entries = report.entries, "Ingestion cancelled");
                } else {
                    self.metrics.record_completed();
                    info!(
                        file = %report.file,
                        entries = report.entries,
                        batches = report.batches,
                        skipped_rows = report.skipped_rows,
                        dropped_payload_lines = report.dropped_payload_lines,
                        "Ingestion complete"
                    );
                }
            }
            Err(e) => {
                self.metrics.record_failed();
                warn!(file = %request.label, committed = e.committed(), error = %e, "Ingestion failed");
            }
        }
        result
    }
}

// ── Per-file cursor ─────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

struct FileCursor<'a, P> {
    file: &'a str,
    dialect: Dialect,
    mode: IngestMode,
    builder: DialectBuilder,
    sink: BatchSink<P>,
    enricher: &'a CorrelationEnricher,
    lines: u64,
    bytes: u64,
    truncated_lines: u64,
}

impl<'a, P: BatchPersister> FileCursor<'a, P> {
    async fn push_lines(&mut self, lines: Vec<String>, cancel: &CancellationToken) -> Result<Flow, IngestError> {
        for line in lines {
            if cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            self.push_line(&line).await?;
        }
        Ok(Flow::Continue)
    }

    async fn push_line(&mut self, line: &str) -> Result<(), IngestError> {
        self.lines += 1;
        if let Some(entry) = self.builder.push_line(line) {
            self.emit(entry).await?;
        }
        Ok(())
    }

    /// Release the builder's open entry and the trailing partial batch.
    async fn finish(&mut self) -> Result<(), IngestError> {
        if let Some(entry) = self.builder.finish() {
            self.emit(entry).await?;
        }
        let flushed = self.sink.flush().await;
        flushed.map_err(|e| self.persistence(e))
    }

    async fn emit(&mut self, mut entry: LogEntry) -> Result<(), IngestError> {
        self.enricher.enrich(&mut entry);
        entry.seal();
        let added = self.sink.add(entry).await;
        added.map_err(|e| self.persistence(e))
    }

    fn persistence(&self, source: PersistError) -> IngestError {
        IngestError::Persistence {
            file: self.file.to_string(),
            line: self.lines,
            committed: self.sink.committed(),
            source,
        }
    }

    fn report_streamed(&mut self, reassembler: &LineReassembler, cancelled: bool) -> IngestReport {
        self.bytes = reassembler.bytes_seen();
        self.truncated_lines = reassembler.truncated_lines();
        self.report(cancelled)
    }

    fn report(&self, cancelled: bool) -> IngestReport {
        IngestReport {
            file: self.file.to_string(),
            dialect: self.dialect,
            mode: self.mode,
            entries: self.sink.committed(),
            batches: self.sink.batches(),
            lines: self.lines,
            bytes: self.bytes,
            skipped_rows: self.builder.skipped_rows(),
            truncated_lines: self.truncated_lines,
            dropped_payload_lines: self.builder.dropped_payload_lines(),
            cancelled,
        }
    }
}

enum Next {
    Chunk(Bytes),
    End,
    Cancelled,
    Failed(BlobError),
}

async fn next_chunk(stream: &mut ByteStream, cancel: &CancellationToken) -> Next {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Next::Cancelled,
        item = stream.next() => match item {
            Some(Ok(chunk)) => Next::Chunk(chunk),
            Some(Err(e)) => Next::Failed(e),
            None => Next::End,
        },
    }
}
