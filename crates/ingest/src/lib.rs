// Log ingestion pipeline: blob bytes in, enriched entry batches out.

// Core infrastructure
pub mod conf;
pub mod blob;
pub mod parser;

// Pipeline stages
pub mod correlate;
pub mod ingest;

pub mod runtime;
