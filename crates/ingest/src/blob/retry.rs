//! Retry — byte retrieval that rides out a blob store's eventual-consistency window.
//!
//! Only `NotFound` is retried. Every other failure is surfaced on the first
//! attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::{BlobError, BlobRef, BlobStore, ByteStream};
use crate::ingest::metrics::IngestMetrics;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Blob {blob} still not available after {attempts} attempts")]
    Exhausted { blob: String, attempts: u32 },
    #[error("Permission denied for blob {blob}: {reason}")]
    Denied { blob: String, reason: String },
    #[error("Invalid blob reference {blob}: {reason}")]
    Invalid { blob: String, reason: String },
    #[error("Retrieval of blob {blob} cancelled during backoff")]
    Cancelled { blob: String },
    #[error("Failed to retrieve blob {blob}: {source}")]
    Failed {
        blob: String,
        #[source]
        source: BlobError,
    },
}

/// Exponential backoff: the delay after failed attempt `k` (1-based) is
/// `base_delay * 2^(k-1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// An opened blob stream plus the best-effort total size.
pub struct OpenedStream {
    pub stream: ByteStream,
    pub size_hint: Option<u64>,
}

pub struct RetryingByteSource {
    store: Arc<dyn BlobStore>,
    policy: RetryPolicy,
    metrics: Option<Arc<IngestMetrics>>,
}

impl RetryingByteSource {
    pub fn new(store: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<IngestMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Buffered read of the whole blob.
    pub async fn fetch_all(&self, blob: &BlobRef, cancel: &CancellationToken) -> Result<Bytes, RetrievalError> {
        self.with_retry(blob, cancel, || self.store.fetch(blob)).await
    }

    /// Incremental read. The size probe runs after the stream opened, so it
    /// sees the blob once it is visible; its failure only loses the hint.
    pub async fn open_stream(
        &self,
        blob: &BlobRef,
        cancel: &CancellationToken,
    ) -> Result<OpenedStream, RetrievalError> {
        let stream = self.with_retry(blob, cancel, || self.store.fetch_stream(blob)).await?;
        let size_hint = self.probe_size(blob).await;
        Ok(OpenedStream { stream, size_hint })
    }

    /// Single best-effort size probe for a blob already known to exist.
    pub async fn probe_size(&self, blob: &BlobRef) -> Option<u64> {
        match self.store.head_size(blob).await {
            Ok(size) => Some(size),
            Err(e) => {
                debug!(blob = %blob, error = %e, "size probe unavailable");
                None
            }
        }
    }

    /// Size probe for a blob that may not be visible yet. `NotFound` is
    /// retried under the same policy as reads; any other failure means the
    /// size is unknown.
    pub async fn resolve_size(
        &self,
        blob: &BlobRef,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>, RetrievalError> {
        self.with_retry(blob, cancel, || async move {
            match self.store.head_size(blob).await {
                Ok(size) => Ok(Some(size)),
                Err(e) if e.is_transient() => Err(e),
                Err(e) => {
                    debug!(blob = %blob, error = %e, "size probe unavailable");
                    Ok(None)
                }
            }
        })
        .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        blob: &BlobRef,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetrievalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BlobError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(blob = %blob, attempt, "blob became available");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    if attempt >= max_attempts {
                        warn!(blob = %blob, attempts = attempt, "giving up on blob, still not found");
                        return Err(RetrievalError::Exhausted {
                            blob: blob.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        blob = %blob,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "blob not found yet, retrying"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry();
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(blob = %blob, attempt, "retry abandoned, cancelled");
                            return Err(RetrievalError::Cancelled { blob: blob.to_string() });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(classify(blob, e)),
            }
        }
    }
}

fn classify(blob: &BlobRef, err: BlobError) -> RetrievalError {
    match err {
        BlobError::PermissionDenied(reason) => RetrievalError::Denied {
            blob: blob.to_string(),
            reason,
        },
        BlobError::InvalidReference(reason) => RetrievalError::Invalid {
            blob: blob.to_string(),
            reason,
        },
        other => RetrievalError::Failed {
            blob: blob.to_string(),
            source: other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::fake::{FakeBlob, FakeBlobStore};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4), Duration::from_secs(16));
        assert_eq!(policy.delay_after(10), Duration::from_secs(60));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_succeeds_on_fifth_attempt() {
        let store = Arc::new(FakeBlobStore::new());
        store.insert_blob("trace.log", FakeBlob::new("payload").not_found_for(4)).await;
        let source = RetryingByteSource::new(store.clone(), fast_policy(5));

        let bytes = source.fetch_all(&BlobRef::from("trace.log"), &CancellationToken::new()).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"payload"));
        assert_eq!(store.attempts("trace.log").await, 5);
    }

    #[tokio::test]
    async fn test_exhausts_after_cap() {
        let store = Arc::new(FakeBlobStore::new());
        let source = RetryingByteSource::new(store.clone(), fast_policy(5));

        let err = source.fetch_all(&BlobRef::from("never.log"), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Exhausted { attempts: 5, .. }));
        assert_eq!(store.attempts("never.log").await, 5);
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_retried() {
        let store = Arc::new(FakeBlobStore::new());
        store.insert_blob("secret.log", FakeBlob::new("x").denied()).await;
        let source = RetryingByteSource::new(store.clone(), fast_policy(5));

        let err = source.fetch_all(&BlobRef::from("secret.log"), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Denied { .. }));
        assert_eq!(store.attempts("secret.log").await, 1);
    }

    #[tokio::test]
    async fn test_open_stream_retries_and_probes_size() {
        let store = Arc::new(FakeBlobStore::new());
        store.insert_blob("big.log", FakeBlob::new("0123456789").not_found_for(1)).await;
        let source = RetryingByteSource::new(store.clone(), fast_policy(3));

        let opened = source.open_stream(&BlobRef::from("big.log"), &CancellationToken::new()).await.unwrap();
        assert_eq!(opened.size_hint, Some(10));
        assert_eq!(store.attempts("big.log").await, 2);
    }

    #[tokio::test]
    async fn test_missing_size_probe_is_not_fatal() {
        let store = Arc::new(FakeBlobStore::new());
        store.insert_blob("a.log", FakeBlob::new("abc").without_size()).await;
        let source = RetryingByteSource::new(store, fast_policy(3));

        let opened = source.open_stream(&BlobRef::from("a.log"), &CancellationToken::new()).await.unwrap();
        assert_eq!(opened.size_hint, None);
    }

    #[tokio::test]
    async fn test_retries_are_counted() {
        let store = Arc::new(FakeBlobStore::new());
        store.insert_blob("a.log", FakeBlob::new("abc").not_found_for(2)).await;
        let metrics = Arc::new(IngestMetrics::default());
        let source = RetryingByteSource::new(store, fast_policy(5)).with_metrics(metrics.clone());

        source.fetch_all(&BlobRef::from("a.log"), &CancellationToken::new()).await.unwrap();
        assert_eq!(metrics.snapshot().retries, 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let store = Arc::new(FakeBlobStore::new());
        let slow = RetryPolicy { max_attempts: 5, base_delay: Duration::from_secs(60), max_delay: Duration::from_secs(60) };
        let source = RetryingByteSource::new(store.clone(), slow);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            source.fetch_all(&BlobRef::from("late.log"), &cancel),
        )
        .await
        .expect("backoff ignored cancellation");
        assert!(matches!(result, Err(RetrievalError::Cancelled { .. })));
        assert_eq!(store.attempts("late.log").await, 1);
    }

    #[tokio::test]
    async fn test_resolve_size_waits_for_visibility() {
        let store = Arc::new(FakeBlobStore::new());
        store.insert_blob("late.log", FakeBlob::new("0123456789").not_found_for(2)).await;
        store.insert_blob("opaque.log", FakeBlob::new("abc").without_size()).await;
        let source = RetryingByteSource::new(store.clone(), fast_policy(5));
        let cancel = CancellationToken::new();

        assert_eq!(source.resolve_size(&BlobRef::from("late.log"), &cancel).await.unwrap(), Some(10));
        assert_eq!(source.resolve_size(&BlobRef::from("opaque.log"), &cancel).await.unwrap(), None);
        let err = source.resolve_size(&BlobRef::from("never.log"), &cancel).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Exhausted { attempts: 5, .. }));
        // the window is spent, so the read succeeds first time
        assert_eq!(source.fetch_all(&BlobRef::from("late.log"), &cancel).await.unwrap().len(), 10);
        assert_eq!(store.attempts("late.log").await, 1);
    }
}
