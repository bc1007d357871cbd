//! Fake — in-memory test double for blob operations.
//!
//! Provides a deterministic [`FakeBlobStore`] that implements [`BlobStore`]
//! using in-memory state. Blobs can be scripted to answer "not found" for
//! their first N calls (eventual consistency), to deny access, to hide their
//! size, or to break off mid-stream.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::Mutex;

use super::store::{BlobError, BlobFuture, BlobRef, BlobStore, ByteStream};

/// A canned blob for the fake store.
#[derive(Clone, Debug)]
pub struct FakeBlob {
    pub data: Bytes,
    /// Calls (reads and size probes) answered with `NotFound` before the
    /// blob becomes visible
    pub not_found_for: u32,
    pub denied: bool,
    /// When false, `head_size` fails as if the store had no metadata call
    pub report_size: bool,
    /// Yield this many chunks, then fail the stream
    pub interrupt_after: Option<usize>,
}

impl FakeBlob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            not_found_for: 0,
            denied: false,
            report_size: true,
            interrupt_after: None,
        }
    }

    pub fn not_found_for(mut self, reads: u32) -> Self {
        self.not_found_for = reads;
        self
    }

    pub fn denied(mut self) -> Self {
        self.denied = true;
        self
    }

    pub fn without_size(mut self) -> Self {
        self.report_size = false;
        self
    }

    pub fn interrupt_after(mut self, chunks: usize) -> Self {
        self.interrupt_after = Some(chunks);
        self
    }
}

/// Mutable inner state protected by a mutex.
#[derive(Default)]
struct Inner {
    blobs: HashMap<String, FakeBlob>,
    attempts: HashMap<String, u32>,
}

/// A fake blob store for deterministic testing.
pub struct FakeBlobStore {
    inner: Mutex<Inner>,
    chunk_size: usize,
}

impl FakeBlobStore {
    /// Create an empty fake store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            chunk_size: 4096,
        }
    }

    /// Chunk size used by `fetch_stream`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Seed a plain, immediately visible blob.
    pub async fn insert(&self, name: &str, data: impl Into<Bytes>) {
        self.insert_blob(name, FakeBlob::new(data)).await;
    }

    /// Seed a scripted blob.
    pub async fn insert_blob(&self, name: &str, blob: FakeBlob) {
        self.inner.lock().await.blobs.insert(name.to_string(), blob);
    }

    /// Number of `fetch` + `fetch_stream` calls made for `name`.
    pub async fn attempts(&self, name: &str) -> u32 {
        self.inner.lock().await.attempts.get(name).copied().unwrap_or(0)
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.lock().await.blobs.contains_key(name)
    }

    /// Count one read attempt and resolve it against the scripted state.
    async fn read(&self, blob: &BlobRef) -> Result<FakeBlob, BlobError> {
        let mut state = self.inner.lock().await;
        *state.attempts.entry(blob.to_string()).or_insert(0) += 1;

        let entry = state
            .blobs
            .get_mut(blob.as_str())
            .ok_or_else(|| BlobError::NotFound(blob.to_string()))?;

        if entry.denied {
            return Err(BlobError::PermissionDenied(blob.to_string()));
        }
        if entry.not_found_for > 0 {
            entry.not_found_for -= 1;
            return Err(BlobError::NotFound(blob.to_string()));
        }
        Ok(entry.clone())
    }
}

impl Default for FakeBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── BlobStore implementation ────────────────────────────────────

impl BlobStore for FakeBlobStore {
    fn fetch<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, Bytes> {
        Box::pin(async move {
            let found = self.read(blob).await?;
            Ok(found.data)
        })
    }

    fn fetch_stream<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, ByteStream> {
        Box::pin(async move {
            let found = self.read(blob).await?;
            let chunk_size = self.chunk_size;
            let name = blob.to_string();
            let interrupt_after = found.interrupt_after;
            let data = found.data;

            let stream = async_stream::stream! {
                let mut offset = 0;
                let mut sent = 0usize;
                while offset < data.len() {
                    if interrupt_after == Some(sent) {
                        yield Err(BlobError::Backend(format!("connection reset while reading {}", name)));
                        return;
                    }
                    let end = (offset + chunk_size).min(data.len());
                    yield Ok(data.slice(offset..end));
                    offset = end;
                    sent += 1;
                }
            };
            Ok(Box::pin(stream) as ByteStream)
        })
    }

    fn head_size<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, u64> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            let entry = state
                .blobs
                .get_mut(blob.as_str())
                .ok_or_else(|| BlobError::NotFound(blob.to_string()))?;
            if !entry.report_size {
                return Err(BlobError::Backend("size probe unsupported".to_string()));
            }
            if entry.not_found_for > 0 {
                entry.not_found_for -= 1;
                return Err(BlobError::NotFound(blob.to_string()));
            }
            Ok(entry.data.len() as u64)
        })
    }

    fn delete<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            state
                .blobs
                .remove(blob.as_str())
                .map(|_| ())
                .ok_or_else(|| BlobError::NotFound(blob.to_string()))
        })
    }
}
