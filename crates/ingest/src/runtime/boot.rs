//! Boot — logging init, config load, blob store and ingestor creation.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::blob::{BlobStore, LocalBlobStore};
use crate::conf::IngestConfig;
use crate::ingest::Ingestor;

/// Initialise the tracing / logging subsystem. Logs go to stderr so stdout
/// carries only entries.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load config and build an ingestor over the local blob root.
pub fn boot() -> Result<(Arc<Ingestor>, IngestConfig), Box<dyn std::error::Error>> {
    info!("Starting ingest v{}", env!("CARGO_PKG_VERSION"));

    let config = IngestConfig::load()?;
    info!(
        "Loaded configuration: blob_root={}, batch_size={}, stream_threshold={}B",
        config.blob_root, config.batch_size, config.stream_threshold_bytes
    );
    info!(
        "Retry policy: max_attempts={}, base_delay={}ms, max_delay={}ms",
        config.retry.max_attempts, config.retry.base_delay_ms, config.retry.max_delay_ms
    );

    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.blob_root));
    let ingestor = Arc::new(Ingestor::new(store, config.clone()));

    Ok((ingestor, config))
}
