//! Batch sink — groups sealed entries into fixed-size batches and hands
//! each one to the caller's persister, waiting for it before accepting more.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::parser::LogEntry;

/// Failure reported by a persister. Carries whatever the caller's storage
/// layer returned.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PersistError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PersistError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self { message: message.into(), source: Some(source.into()) }
    }
}

pub type PersistFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PersistError>> + Send + 'a>>;

/// Durable destination for batches.
///
/// `persist` owns the batch; once it resolves `Ok` the entries count as
/// committed. Closures `FnMut(Vec<LogEntry>) -> impl Future` implement it.
pub trait BatchPersister: Send {
    fn persist(&mut self, batch: Vec<LogEntry>) -> PersistFuture<'_>;
}

impl<F, Fut> BatchPersister for F
where
    F: FnMut(Vec<LogEntry>) -> Fut + Send,
    Fut: Future<Output = Result<(), PersistError>> + Send + 'static,
{
    fn persist(&mut self, batch: Vec<LogEntry>) -> PersistFuture<'_> {
        Box::pin(self(batch))
    }
}

pub struct BatchSink<P> {
    persister: P,
    batch_size: usize,
    current: Vec<LogEntry>,
    committed: u64,
    batches: u64,
}

impl<P: BatchPersister> BatchSink<P> {
    pub fn new(persister: P, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            persister,
            batch_size,
            current: Vec::with_capacity(batch_size),
            committed: 0,
            batches: 0,
        }
    }

    /// Append one entry. When the batch is full it is persisted before
    /// returning; the next entry starts a fresh batch.
    pub async fn add(&mut self, entry: LogEntry) -> Result<(), PersistError> {
        self.current.push(entry);
        if self.current.len() >= self.batch_size {
            self.persist_current().await?;
        }
        Ok(())
    }

    /// Persist the trailing partial batch, if any.
    pub async fn flush(&mut self) -> Result<(), PersistError> {
        if self.current.is_empty() {
            return Ok(());
        }
        self.persist_current().await
    }

    /// Entries acknowledged by the persister.
    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Entries accepted but not yet persisted.
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    async fn persist_current(&mut self) -> Result<(), PersistError> {
        let batch = std::mem::replace(&mut self.current, Vec::with_capacity(self.batch_size));
        let len = batch.len() as u64;
        self.persister.persist(batch).await?;
        self.committed += len;
        self.batches += 1;
        debug!(batch = self.batches, entries = len, committed = self.committed, "Batch persisted");
        Ok(())
    }
}

// ── In-memory persister ─────────────────────────────────────────

/// Collects every batch in memory. Optionally rejects the n-th batch
/// (1-based) to exercise failure handling.
#[derive(Clone, Default)]
pub struct MemoryPersister {
    batches: Arc<Mutex<Vec<Vec<LogEntry>>>>,
    fail_on_batch: Option<usize>,
    calls: usize,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(batch: usize) -> Self {
        Self { fail_on_batch: Some(batch), ..Self::default() }
    }

    pub async fn batches(&self) -> Vec<Vec<LogEntry>> {
        self.batches.lock().await.clone()
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }
}

impl BatchPersister for MemoryPersister {
    fn persist(&mut self, batch: Vec<LogEntry>) -> PersistFuture<'_> {
        Box::pin(async move {
            self.calls += 1;
            if self.fail_on_batch == Some(self.calls) {
                return Err(PersistError::msg(format!("batch {} rejected", self.calls)));
            }
            self.batches.lock().await.push(batch);
            Ok(())
        })
    }
}
