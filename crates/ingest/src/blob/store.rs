//! Store — abstract interface over a blob store.
//!
//! `local.rs` provides the directory-backed implementation.
//! `fake.rs` provides a test double.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;
use tokio_stream::Stream;

#[derive(Error, Debug)]
pub enum BlobError {
    /// Also returned during a store's eventual-consistency window.
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob store error: {0}")]
    Backend(String),
}

impl BlobError {
    /// Only a not-found answer may turn into a success later.
    pub fn is_transient(&self) -> bool {
        matches!(self, BlobError::NotFound(_))
    }
}

/// Opaque reference to a blob (object key, relative path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlobRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BlobError>> + Send>>;

pub type BlobFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BlobError>> + Send + 'a>>;

/// Unified async interface over a blob store.
///
/// Object-safe thanks to `Pin<Box<…>>` returns.
/// Implementations must be `Send + Sync` so they can be shared across
/// concurrently ingested files behind an `Arc`.
pub trait BlobStore: Send + Sync {
    /// Read the whole blob into memory.
    fn fetch<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, Bytes>;

    /// Open the blob as an incremental stream of chunks.
    fn fetch_stream<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, ByteStream>;

    /// Size in bytes (HEAD-style metadata call).
    fn head_size<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, u64>;

    fn delete<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, ()>;
}
