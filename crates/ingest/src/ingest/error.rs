use thiserror::Error;

use crate::blob::{BlobError, RetrievalError};
use super::sink::PersistError;

/// Why a file ingestion stopped early. Every variant names the file and
/// how many entries were already committed when it stopped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Could not retrieve {file}: {source}")]
    Retrieval {
        file: String,
        #[source]
        source: RetrievalError,
    },

    #[error("Stream for {file} broke at byte {offset} after {committed} committed entries: {source}")]
    StreamInterrupted {
        file: String,
        offset: u64,
        committed: u64,
        #[source]
        source: BlobError,
    },

    #[error("Persisting {file} failed near line {line} after {committed} committed entries: {source}")]
    Persistence {
        file: String,
        line: u64,
        committed: u64,
        #[source]
        source: PersistError,
    },
}

impl IngestError {
    pub fn file(&self) -> &str {
        match self {
            Self::Retrieval { file, .. }
            | Self::StreamInterrupted { file, .. }
            | Self::Persistence { file, .. } => file,
        }
    }

    /// Entries persisted before the failure. Nothing is rolled back.
    pub fn committed(&self) -> u64 {
        match self {
            Self::Retrieval { .. } => 0,
            Self::StreamInterrupted { committed, .. } | Self::Persistence { committed, .. } => *committed,
        }
    }
}
