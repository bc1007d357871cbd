//! Blob module — retrieval of raw log bytes from a blob store.
//!
//! - `store.rs`: the [`BlobStore`] seam every retrieval goes through
//! - `local.rs`: directory-backed implementation used by the binary
//! - `fake.rs`: in-memory test double with scriptable not-found windows
//! - `retry.rs`: [`RetryingByteSource`], exponential backoff over a store

pub mod store;
pub mod local;
pub mod fake;
pub mod retry;

pub use store::{BlobError, BlobFuture, BlobRef, BlobStore, ByteStream};
pub use local::LocalBlobStore;
pub use fake::{FakeBlob, FakeBlobStore};
pub use retry::{OpenedStream, RetrievalError, RetryPolicy, RetryingByteSource};
