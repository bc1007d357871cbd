use std::sync::Arc;

use ingest::blob::{BlobStore, FakeBlobStore};
use ingest::conf::{IngestConfig, RetryConfig};
use ingest::ingest::{IngestMode, IngestRequest, Ingestor, MemoryPersister};
use ingest::parser::{Dialect, Direction, Level, LogEntry};

fn config(batch_size: usize) -> IngestConfig {
    IngestConfig {
        batch_size,
        retry: RetryConfig { max_attempts: 3, base_delay_ms: 1, max_delay_ms: 4 },
        ..IngestConfig::default()
    }
}

async fn ingest_both_ways(name: &str, body: &str, batch_size: usize) -> Vec<(Vec<Vec<LogEntry>>, IngestMode)> {
    let store = Arc::new(FakeBlobStore::new().with_chunk_size(13));
    store.insert(name, body.to_string()).await;
    let ingestor = Ingestor::new(store as Arc<dyn BlobStore>, config(batch_size));

    let mut runs = Vec::new();
    for mode in [IngestMode::Buffered, IngestMode::Streaming] {
        let persister = MemoryPersister::new();
        let request = IngestRequest::new(name, name, "test");
        let report = match mode {
            IngestMode::Buffered => ingestor.ingest(request, persister.clone()).await,
            IngestMode::Streaming => ingestor.ingest_incremental(request, persister.clone()).await,
        }
        .unwrap();
        assert_eq!(report.mode, mode);
        assert!(!report.cancelled);
        runs.push((persister.batches().await, mode));
    }
    runs
}

#[tokio::test]
async fn test_end_to_end_bracketed_example() {
    let body = "[INFO] [01/02/2024, 10:00:00] [core]: Call-ID: abc123\n\
                SIP/2.0 200 OK\n\
                Call-ID: abc123\n\
                [ERROR] [01/02/2024, 10:00:01] [core]: done";

    for (batches, mode) in ingest_both_ways("station.log", body, 1).await {
        assert_eq!(batches.len(), 2, "{:?}", mode);
        assert!(batches.iter().all(|b| b.len() == 1));

        let first = &batches[0][0];
        assert_eq!(first.component(), "core");
        assert_eq!(first.level, Level::Info);
        assert_eq!(first.timestamp, 1_704_189_600_000);
        assert_eq!(first.message(), "Call-ID: abc123");
        assert!(first.payload().contains("SIP/2.0 200 OK"));
        assert!(first.is_protocol_message);
        assert_eq!(first.protocol_method.as_deref(), Some("200 OK"));
        assert_eq!(first.call_id(), Some("abc123"));
        assert!(first.matches("ABC123"));

        let second = &batches[1][0];
        assert_eq!(second.level, Level::Error);
        assert_eq!(second.message(), "done");
        assert_eq!(second.payload(), "");
        assert!(!second.is_protocol_message);
        assert_eq!(second.call_id(), None);
    }
}

#[tokio::test]
async fn test_call_id_only_in_message_is_not_extracted() {
    let body = "[INFO] [01/02/2024, 10:00:00] [core]: Call-ID: abc123\n\
                SIP/2.0 200 OK\n\
                [ERROR] [01/02/2024, 10:00:01] [core]: done";

    for (batches, _) in ingest_both_ways("station.log", body, 1).await {
        let first = &batches[0][0];
        assert!(first.is_protocol_message);
        assert_eq!(first.call_id(), None);
    }
}

#[tokio::test]
async fn test_no_entry_loss_across_batch_boundaries() {
    let batch_size = 7;
    let total = 5 * batch_size + 3;
    let mut body = String::new();
    for i in 0..total {
        body.push_str(&format!("[INFO] [01/02/2024, 10:00:{:02}] [core]: entry {}\n", i % 60, i));
        if i % 3 == 0 {
            body.push_str(&format!("detail for {}\n", i));
        }
    }

    for (batches, mode) in ingest_both_ways("app.log", &body, batch_size).await {
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![7, 7, 7, 7, 7, 3], "{:?}", mode);

        let messages: Vec<String> = batches.iter().flatten().map(|e| e.message().to_string()).collect();
        let expected: Vec<String> = (0..total).map(|i| format!("entry {}", i)).collect();
        assert_eq!(messages, expected);

        let with_detail = batches.iter().flatten().filter(|e| !e.payload().is_empty()).count();
        assert_eq!(with_detail, (0..total).filter(|i| i % 3 == 0).count());
    }
}

#[tokio::test]
async fn test_continuation_accumulation() {
    let body = "[INFO] [01/02/2024, 10:00:00] [core]: first\n\
                plain one\n\
                plain two\n\
                [INFO] [01/02/2024, 10:00:01] [core]: second\n";

    for (batches, _) in ingest_both_ways("app.log", body, 10).await {
        let entries: Vec<&LogEntry> = batches.iter().flatten().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload(), "plain one\nplain two");
        assert_eq!(entries[1].payload(), "");
    }
}

fn csv_row(i: usize) -> String {
    format!(
        "2024-01-02T10:00:00Z,host-{},gateway,\"{{\"\"log\"\":{{\"\"level\"\":\"\"WARN\"\",\"\"message\"\":\"\"row {}\"\",\"\"reportId\"\":{}}}}}\"",
        i % 3,
        i,
        1000 + i
    )
}

#[tokio::test]
async fn test_csv_corruption_isolation() {
    let mut rows: Vec<String> = (0..100).map(csv_row).collect();
    rows.insert(50, "2024-01-02T10:00:00Z,host,\"broken".to_string());
    let body = rows.join("\n") + "\n";

    let store = Arc::new(FakeBlobStore::new().with_chunk_size(97));
    store.insert("blobs/export", body).await;
    let ingestor = Ingestor::new(store as Arc<dyn BlobStore>, config(16));

    for streaming in [false, true] {
        let persister = MemoryPersister::new();
        let request = IngestRequest::new("blobs/export", "events.csv", "t");
        let report = if streaming {
            ingestor.ingest_incremental(request, persister.clone()).await.unwrap()
        } else {
            ingestor.ingest(request, persister.clone()).await.unwrap()
        };

        assert_eq!(report.dialect, Dialect::CsvStructured);
        assert_eq!(report.entries, 100);
        assert_eq!(report.skipped_rows, 1);

        let entries = persister.entries().await;
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].message(), "row 0");
        assert_eq!(entries[99].message(), "row 99");
        assert_eq!(entries[50].message(), "row 50");
        assert!(entries.iter().all(|e| e.level == Level::Warn));
        assert_eq!(entries[7].correlation().report_id.as_deref(), Some("1007"));
    }
}

#[tokio::test]
async fn test_call_trace_export_end_to_end() {
    let body = "\n\
                proto:UDP 2024-01-02T10:00:00.000 10.0.0.1:5060 ---> 10.0.0.2:5060\n\
                INVITE sip:bob@example.com SIP/2.0\n\
                From: <sip:alice@example.com>;tag=1\n\
                To: <sip:bob@example.com>\n\
                Call-ID: trace-42\n\
                \n\
                proto:UDP 2024-01-02T10:00:00.250 10.0.0.2:5060 <--- 10.0.0.1:5060\n\
                SIP/2.0 180 Ringing\n\
                Call-ID: trace-42\n";

    for (batches, mode) in ingest_both_ways("capture.txt", body, 50).await {
        let entries: Vec<&LogEntry> = batches.iter().flatten().collect();
        assert_eq!(entries.len(), 2, "{:?}", mode);

        let invite = entries[0];
        assert_eq!(invite.direction, Some(Direction::Out));
        assert_eq!(invite.component(), "UDP");
        assert_eq!(invite.source_addr.as_deref(), Some("10.0.0.1:5060"));
        assert_eq!(invite.message(), "[OUT] INVITE sip:bob@example.com SIP/2.0");
        assert!(invite.is_protocol_message);
        assert_eq!(invite.protocol_method.as_deref(), Some("INVITE"));
        assert_eq!(invite.call_id(), Some("trace-42"));
        assert_eq!(invite.sip_to.as_deref(), Some("<sip:bob@example.com>"));

        let ringing = entries[1];
        assert_eq!(ringing.direction, Some(Direction::In));
        assert_eq!(ringing.protocol_method.as_deref(), Some("180 Ringing"));
        assert_eq!(ringing.timestamp - invite.timestamp, 250);
    }
}
