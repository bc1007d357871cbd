//! CSV-structured dialect: one quoted row per line,
//! `isoTimestamp,host,service,jsonPayload`, the JSON itself `""`-escaped.
//!
//! Rows are parsed defensively. A row with the wrong column count or a
//! payload that is not a JSON object with a `log` member is skipped and
//! counted; it never affects the rows around it.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::correlate::json::extract_identifiers;
use crate::parser::timestamp;
use crate::parser::traits::{Dialect, EntryBuilder, EntryContext, Level, LogEntry};

const COLUMNS: usize = 4;

pub struct CsvStructuredBuilder {
    ctx: EntryContext,
    /// Configured once; each row gets a reader sized to the row
    csv: csv::ReaderBuilder,
    record: csv::StringRecord,
    rows_seen: u64,
    skipped: u64,
}

#[derive(Debug, Error)]
enum RowError {
    #[error("unreadable row: {0}")]
    Csv(String),
    #[error("expected 4 columns, found {0}")]
    ColumnCount(usize),
    #[error("payload is not JSON: {0}")]
    Json(String),
    #[error("payload has no log object")]
    MissingLog,
}

impl CsvStructuredBuilder {
    pub fn new(ctx: EntryContext) -> Self {
        let mut csv = csv::ReaderBuilder::new();
        csv.has_headers(false).flexible(true);
        Self {
            ctx,
            csv,
            record: csv::StringRecord::with_capacity(256, COLUMNS),
            rows_seen: 0,
            skipped: 0,
        }
    }

    fn parse_row(&mut self, line: &str) -> Result<LogEntry, RowError> {
        let mut reader = self.csv.buffer_capacity(line.len() + 1).from_reader(line.as_bytes());
        match reader.read_record(&mut self.record) {
            Ok(true) => {}
            Ok(false) => return Err(RowError::ColumnCount(0)),
            Err(e) => return Err(RowError::Csv(e.to_string())),
        }

        let record = &self.record;
        if record.len() != COLUMNS {
            return Err(RowError::ColumnCount(record.len()));
        }

        let row_ts = record.get(0).unwrap_or("").trim();
        let host = record.get(1).unwrap_or("").trim();
        let service = record.get(2).unwrap_or("").trim();
        let document: Value = serde_json::from_str(record.get(3).unwrap_or(""))
            .map_err(|e| RowError::Json(e.to_string()))?;

        let root = document.as_object().ok_or(RowError::MissingLog)?;
        let log = root.get("log").and_then(Value::as_object).ok_or(RowError::MissingLog)?;

        let (timestamp, raw_timestamp) = resolve_timestamp(log.get("timestamp"), row_ts);
        let level = log
            .get("level")
            .and_then(Value::as_str)
            .map(Level::from_label)
            .unwrap_or(Level::Info);
        let component = log
            .get("logSource")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(service);
        let message = log.get("message").map(value_text).unwrap_or_default();

        let mut entry = LogEntry::new(&self.ctx, timestamp, raw_timestamp, level, component, message);
        if !host.is_empty() {
            entry.append_payload(&format!("Host: {}", host));
        }
        if !service.is_empty() && service != component {
            entry.append_payload(&format!("Service: {}", service));
        }
        flatten_optional(root, log, &mut entry);
        extract_identifiers(&document, &mut entry);
        Ok(entry)
    }
}

/// `log.timestamp` (text or epoch number) first, then the row column,
/// then ingestion time.
fn resolve_timestamp(log_ts: Option<&Value>, row_ts: &str) -> (i64, String) {
    let from_log = match log_ts {
        Some(Value::String(s)) => timestamp::parse_flexible(s).map(|ms| (ms, s.clone())),
        Some(Value::Number(n)) => n.as_i64().and_then(|v| {
            timestamp::parse_flexible(&v.to_string()).map(|ms| (ms, v.to_string()))
        }),
        _ => None,
    };

    from_log
        .or_else(|| timestamp::parse_flexible(row_ts).map(|ms| (ms, row_ts.to_string())))
        .unwrap_or_else(|| (timestamp::now_ms(), row_ts.to_string()))
}

fn lookup<'a>(root: &'a Map<String, Value>, log: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    log.get(key).or_else(|| root.get(key)).filter(|v| !v.is_null())
}

/// Machine info, thread name and exception cause become labeled payload lines.
fn flatten_optional(root: &Map<String, Value>, log: &Map<String, Value>, entry: &mut LogEntry) {
    if let Some(machine) = lookup(root, log, "machineInfo") {
        match machine {
            Value::Object(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, value_text(v)))
                    .collect();
                entry.append_payload(&format!("Machine: {}", parts.join(", ")));
            }
            other => entry.append_payload(&format!("Machine: {}", value_text(other))),
        }
    }

    if let Some(thread) = lookup(root, log, "threadName") {
        entry.append_payload(&format!("Thread: {}", value_text(thread)));
    }

    if let Some(cause) = lookup(root, log, "exceptionCause") {
        match cause {
            Value::Object(fields) => {
                let class = fields.get("className").or_else(|| fields.get("class")).map(value_text);
                let message = fields.get("message").map(value_text);
                let head = match (class, message) {
                    (Some(c), Some(m)) => format!("{}: {}", c, m),
                    (Some(c), None) => c,
                    (None, Some(m)) => m,
                    (None, None) => Value::Object(fields.clone()).to_string(),
                };
                entry.append_payload(&format!("Exception: {}", head));
                if let Some(Value::Array(frames)) = fields.get("stackTrace") {
                    for frame in frames {
                        entry.append_payload(&format!("    at {}", value_text(frame)));
                    }
                }
            }
            other => entry.append_payload(&format!("Exception: {}", value_text(other))),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl EntryBuilder for CsvStructuredBuilder {
    fn push_line(&mut self, line: &str) -> Option<LogEntry> {
        if line.trim().is_empty() {
            return None;
        }
        self.rows_seen += 1;

        match self.parse_row(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                if self.rows_seen == 1 && !matches!(e, RowError::Csv(_)) {
                    debug!(file = %self.ctx.source_file, "skipping csv header row");
                } else {
                    self.skipped += 1;
                    debug!(file = %self.ctx.source_file, row = self.rows_seen, error = %e, "skipping malformed csv row");
                }
                None
            }
        }
    }

    fn finish(&mut self) -> Option<LogEntry> {
        None
    }

    fn dialect(&self) -> Dialect {
        Dialect::CsvStructured
    }

    fn skipped_rows(&self) -> u64 {
        self.skipped
    }
}
