//! Local — directory-backed [`BlobStore`].
//!
//! References are paths relative to the store root. Anything that would
//! escape the root is rejected as an invalid reference.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;

use super::store::{BlobError, BlobFuture, BlobRef, BlobStore, ByteStream};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    chunk_size: usize,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn resolve(&self, blob: &BlobRef) -> Result<PathBuf, BlobError> {
        let relative = Path::new(blob.as_str());
        if blob.as_str().is_empty() {
            return Err(BlobError::InvalidReference("empty reference".to_string()));
        }

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(BlobError::InvalidReference(format!(
                        "{} escapes the store root",
                        blob
                    )))
                }
            }
        }

        Ok(self.root.join(relative))
    }
}

fn map_io(blob: &BlobRef, err: std::io::Error) -> BlobError {
    match err.kind() {
        ErrorKind::NotFound => BlobError::NotFound(blob.to_string()),
        ErrorKind::PermissionDenied => BlobError::PermissionDenied(blob.to_string()),
        _ => BlobError::Io(err),
    }
}

impl BlobStore for LocalBlobStore {
    fn fetch<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, Bytes> {
        Box::pin(async move {
            let path = self.resolve(blob)?;
            let data = tokio::fs::read(&path).await.map_err(|e| map_io(blob, e))?;
            Ok(Bytes::from(data))
        })
    }

    fn fetch_stream<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, ByteStream> {
        Box::pin(async move {
            let path = self.resolve(blob)?;
            let file = tokio::fs::File::open(&path).await.map_err(|e| map_io(blob, e))?;
            let stream = ReaderStream::with_capacity(file, self.chunk_size)
                .map(|chunk| chunk.map_err(BlobError::Io));
            Ok(Box::pin(stream) as ByteStream)
        })
    }

    fn head_size<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, u64> {
        Box::pin(async move {
            let path = self.resolve(blob)?;
            let metadata = tokio::fs::metadata(&path).await.map_err(|e| map_io(blob, e))?;
            if !metadata.is_file() {
                return Err(BlobError::InvalidReference(format!("{} is not a file", blob)));
            }
            Ok(metadata.len())
        })
    }

    fn delete<'a>(&'a self, blob: &'a BlobRef) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            let path = self.resolve(blob)?;
            tokio::fs::remove_file(&path).await.map_err(|e| map_io(blob, e))
        })
    }
}
