use std::sync::Arc;

use futures_util::future::join_all;
use ingest::blob::{BlobStore, FakeBlob, FakeBlobStore};
use ingest::conf::{IngestConfig, RetryConfig};
use ingest::ingest::{IngestRequest, Ingestor, MemoryPersister};

fn body(file: usize, entries: usize) -> String {
    (0..entries)
        .map(|i| format!("[INFO] [01/02/2024, 10:00:00] [worker-{}]: message {}\ncontinuation {}\n", file, i, i))
        .collect()
}

#[tokio::test]
async fn test_files_ingest_concurrently_into_one_sink() {
    let store = Arc::new(FakeBlobStore::new().with_chunk_size(64));
    let sizes = [3usize, 40, 17, 1, 25];
    for (file, &n) in sizes.iter().enumerate() {
        let blob = FakeBlob::new(body(file, n)).not_found_for((file % 2) as u32);
        store.insert_blob(&format!("f{}.log", file), blob).await;
    }

    let config = IngestConfig {
        batch_size: 4,
        retry: RetryConfig { max_attempts: 3, base_delay_ms: 1, max_delay_ms: 2 },
        ..IngestConfig::default()
    };
    let ingestor = Arc::new(Ingestor::new(store as Arc<dyn BlobStore>, config));
    let shared = MemoryPersister::new();

    let runs = (0..sizes.len()).map(|file| {
        let ingestor = Arc::clone(&ingestor);
        let persister = shared.clone();
        async move {
            let name = format!("f{}.log", file);
            let request = IngestRequest::new(name.as_str(), name.as_str(), format!("tag-{}", file));
            if file % 2 == 0 {
                ingestor.ingest(request, persister).await
            } else {
                ingestor.ingest_incremental(request, persister).await
            }
        }
    });
    let reports = join_all(runs).await;

    for (file, report) in reports.into_iter().enumerate() {
        let report = report.unwrap();
        assert_eq!(report.entries, sizes[file] as u64);
    }

    // Batches from different files interleave, but each file's own entries
    // keep their order and never share a batch with another file.
    let batches = shared.batches().await;
    for batch in &batches {
        assert!(batch.windows(2).all(|w| w[0].source_file() == w[1].source_file()));
    }
    for (file, &n) in sizes.iter().enumerate() {
        let label = format!("f{}.log", file);
        let messages: Vec<String> = batches
            .iter()
            .flatten()
            .filter(|e| e.source_file() == label)
            .map(|e| e.message().to_string())
            .collect();
        let expected: Vec<String> = (0..n).map(|i| format!("message {}", i)).collect();
        assert_eq!(messages, expected);
    }

    let snap = ingestor.metrics().snapshot();
    assert_eq!(snap.files_completed, sizes.len() as u64);
    assert_eq!(snap.entries, sizes.iter().sum::<usize>() as u64);
    assert_eq!(snap.retries, 2);
}
