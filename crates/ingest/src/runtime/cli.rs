//! CLI — ingest local files concurrently and print entries as NDJSON.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::blob::BlobRef;
use crate::conf::IngestConfig;
use crate::ingest::{BatchPersister, IngestRequest, Ingestor, PersistError, PersistFuture};
use crate::parser::LogEntry;

const DEFAULT_TAG: &str = "cli";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub tag: String,
    pub blobs: Vec<String>,
}

impl CliArgs {
    /// `ingest [--tag <tag>] <blob-ref>...`
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut tag = DEFAULT_TAG.to_string();
        let mut blobs = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--tag" => tag = args.next().ok_or("--tag needs a value")?,
                s if s.starts_with("--tag=") => tag = s["--tag=".len()..].to_string(),
                s if s.starts_with("--") => return Err(format!("unknown option {}", s)),
                other => blobs.push(other.to_string()),
            }
        }

        if blobs.is_empty() {
            return Err("usage: ingest [--tag <tag>] <blob-ref>...".to_string());
        }
        Ok(Self { tag, blobs })
    }
}

/// Writes each batch as newline-delimited JSON. Clones share one writer,
/// so batches from concurrent files never interleave.
pub struct NdjsonPersister<W> {
    out: Arc<Mutex<W>>,
}

impl<W> Clone for NdjsonPersister<W> {
    fn clone(&self) -> Self {
        Self { out: Arc::clone(&self.out) }
    }
}

impl<W: AsyncWrite + Unpin + Send> NdjsonPersister<W> {
    pub fn new(out: W) -> Self {
        Self { out: Arc::new(Mutex::new(out)) }
    }

    pub fn shared(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.out)
    }
}

impl<W: AsyncWrite + Unpin + Send> BatchPersister for NdjsonPersister<W> {
    fn persist(&mut self, batch: Vec<LogEntry>) -> PersistFuture<'_> {
        Box::pin(async move {
            let mut buf = Vec::with_capacity(batch.len() * 256);
            for entry in &batch {
                serde_json::to_writer(&mut buf, entry)
                    .map_err(|e| PersistError::with_source("failed to encode entry", e))?;
                buf.push(b'\n');
            }
            let mut out = self.out.lock().await;
            out.write_all(&buf)
                .await
                .map_err(|e| PersistError::with_source("failed to write batch", e))?;
            out.flush()
                .await
                .map_err(|e| PersistError::with_source("failed to flush batch", e))
        })
    }
}

/// Label stamped on entries: the last path segment of the reference.
fn label_for(blob: &str) -> String {
    Path::new(blob)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| blob.to_string())
}

/// Ingest every blob, at most `max_concurrent_files` at a time. Returns the
/// number of files that failed.
pub async fn run<W>(
    ingestor: Arc<Ingestor>,
    config: &IngestConfig,
    args: CliArgs,
    persister: NdjsonPersister<W>,
    cancel: CancellationToken,
) -> usize
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(config.max_concurrent_files.max(1)));
    let mut tasks = JoinSet::new();

    for blob in args.blobs {
        let permits = Arc::clone(&permits);
        let ingestor = Arc::clone(&ingestor);
        let request = IngestRequest::new(BlobRef::new(blob.as_str()), label_for(&blob), args.tag.clone())
            .with_cancel(cancel.child_token());
        let persister = persister.clone();

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return false;
            };
            match ingestor.ingest_file(request, persister).await {
                Ok(report) => {
                    info!(
                        file = %report.file,
                        dialect = report.dialect.as_str(),
                        mode = ?report.mode,
                        entries = report.entries,
                        lines = report.lines,
                        cancelled = report.cancelled,
                        "File done"
                    );
                    true
                }
                Err(e) => {
                    error!(file = %e.file(), committed = e.committed(), "{}", e);
                    false
                }
            }
        });
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                warn!("Ingestion task aborted: {}", e);
                failed += 1;
            }
        }
    }

    let snapshot = ingestor.metrics().snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => info!(metrics = %json, "Ingestion summary"),
        Err(e) => warn!("Failed to encode metrics summary: {}", e),
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobStore, FakeBlobStore};
    use crate::conf::RetryConfig;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = CliArgs::parse(args(&["--tag", "red", "a.log", "b.csv"])).unwrap();
        assert_eq!(parsed.tag, "red");
        assert_eq!(parsed.blobs, vec!["a.log", "b.csv"]);

        let parsed = CliArgs::parse(args(&["--tag=blue", "a.log"])).unwrap();
        assert_eq!(parsed.tag, "blue");

        assert!(CliArgs::parse(args(&[])).is_err());
        assert!(CliArgs::parse(args(&["--tag"])).is_err());
        assert!(CliArgs::parse(args(&["--verbose", "a.log"])).is_err());
    }

    #[test]
    fn test_label_is_file_name() {
        assert_eq!(label_for("2024/03/station-7.log"), "station-7.log");
        assert_eq!(label_for("plain"), "plain");
    }

    #[tokio::test]
    async fn test_run_writes_ndjson_for_every_file() {
        let store = Arc::new(FakeBlobStore::new());
        store.insert("a.log", &b"[INFO] [01/02/2024, 10:00:00] [core]: first\n"[..]).await;
        store
            .insert("b.log", &b"[WARN] [01/02/2024, 10:00:01] [core]: second\n[INFO] [01/02/2024, 10:00:02] [core]: third\n"[..])
            .await;
        let config = IngestConfig {
            batch_size: 1,
            retry: RetryConfig { max_attempts: 2, base_delay_ms: 1, max_delay_ms: 1 },
            ..IngestConfig::default()
        };
        let ingestor = Arc::new(Ingestor::new(store as Arc<dyn BlobStore>, config.clone()));

        let persister = NdjsonPersister::new(Vec::<u8>::new());
        let out = persister.shared();
        let failed = run(
            Arc::clone(&ingestor),
            &config,
            CliArgs { tag: "t".into(), blobs: vec!["a.log".into(), "b.log".into(), "missing.log".into()] },
            persister,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(failed, 1);
        let written = String::from_utf8(out.lock().await.clone()).unwrap();
        let lines: Vec<serde_json::Value> =
            written.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|v| v["sourceTag"] == "t"));
    }
}
