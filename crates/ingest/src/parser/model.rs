use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Largest payload an accumulating builder keeps for one entry.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Severity of a log entry. Dialects without levels default to `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    /// Map a level label from any dialect; unknown labels become `Info`.
    pub fn from_label(label: &str) -> Level {
        match label.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" | "VERBOSE" | "FINE" | "FINER" | "FINEST" => Level::Debug,
            "WARN" | "WARNING" => Level::Warn,
            "ERROR" | "ERR" | "FATAL" | "SEVERE" | "CRITICAL" | "CRIT" => Level::Error,
            _ => Level::Info,
        }
    }
}

/// The closed set of textual log formats this pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `[LEVEL] [date, time] [component]: message` and its ISO sibling
    BracketedLog,
    /// Quoted 4-column rows with an embedded JSON document
    CsvStructured,
    /// `proto:<t> <ts> <src> ---> <dst>` grouped packet dumps
    CallTraceExport,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::BracketedLog => "bracketed_log",
            Dialect::CsvStructured => "csv_structured",
            Dialect::CallTraceExport => "call_trace_export",
        }
    }
}

/// Flow direction of a captured message, taken from the header arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

/// Tag markers found on a raw line; shown in front of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Annotation {
    Timeout,
    Recovery,
}

impl Annotation {
    pub fn label(&self) -> &'static str {
        match self {
            Annotation::Timeout => "TIMEOUT",
            Annotation::Recovery => "RECOVERY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationField {
    CallId,
    ReportId,
    OperatorId,
    ExtensionId,
    StationId,
}

/// Cross-referencing identifiers. Each one is set at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
}

impl Correlation {
    fn slot(&mut self, field: CorrelationField) -> &mut Option<String> {
        match field {
            CorrelationField::CallId => &mut self.call_id,
            CorrelationField::ReportId => &mut self.report_id,
            CorrelationField::OperatorId => &mut self.operator_id,
            CorrelationField::ExtensionId => &mut self.extension_id,
            CorrelationField::StationId => &mut self.station_id,
        }
    }
}

/// Lowercased copies of the searchable text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchText {
    pub message: String,
    pub payload: String,
    pub component: String,
    pub call_id: Option<String>,
}

/// Provenance shared by every entry of one file.
#[derive(Debug, Clone)]
pub struct EntryContext {
    pub source_file: Arc<str>,
    pub source_tag: Arc<str>,
}

impl EntryContext {
    pub fn new(source_file: &str, source_tag: &str) -> Self {
        Self {
            source_file: source_file.into(),
            source_tag: source_tag.into(),
        }
    }
}

/// One structured record.
///
/// Text fields that feed the search shadow are private: every mutation goes
/// through a method that drops the shadow, and [`LogEntry::seal`] rebuilds it
/// once the entry is complete.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Epoch milliseconds; ingestion wall-clock time when unparseable
    pub timestamp: i64,
    pub raw_timestamp: String,
    pub level: Level,
    component: String,
    message: String,
    payload: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    pub is_protocol_message: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_addr: Option<String>,
    #[serde(flatten)]
    correlation: Correlation,
    source_file: Arc<str>,
    source_tag: Arc<str>,
    #[serde(skip)]
    payload_lines: usize,
    #[serde(skip)]
    payload_full: bool,
    #[serde(skip)]
    search: Option<SearchText>,
}

impl LogEntry {
    pub fn new(
        ctx: &EntryContext,
        timestamp: i64,
        raw_timestamp: impl Into<String>,
        level: Level,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            raw_timestamp: raw_timestamp.into(),
            level,
            component: component.into(),
            message: message.into(),
            payload: String::new(),
            annotations: Vec::new(),
            is_protocol_message: false,
            protocol_method: None,
            sip_from: None,
            sip_to: None,
            direction: None,
            source_addr: None,
            dest_addr: None,
            correlation: Correlation::default(),
            source_file: Arc::clone(&ctx.source_file),
            source_tag: Arc::clone(&ctx.source_tag),
            payload_lines: 0,
            payload_full: false,
            search: None,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn payload_line_count(&self) -> usize {
        self.payload_lines
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    pub fn call_id(&self) -> Option<&str> {
        self.correlation.call_id.as_deref()
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }

    /// Message with annotation labels in front, e.g. `[TIMEOUT] no answer`.
    pub fn display_message(&self) -> String {
        if self.annotations.is_empty() {
            return self.message.clone();
        }
        let mut out = String::with_capacity(self.message.len() + 16);
        for annotation in &self.annotations {
            out.push('[');
            out.push_str(annotation.label());
            out.push_str("] ");
        }
        out.push_str(&self.message);
        out
    }

    /// Append one continuation line; lines are joined by `\n`.
    pub fn append_payload(&mut self, line: &str) {
        if self.payload_lines > 0 {
            self.payload.push('\n');
        }
        self.payload.push_str(line);
        self.payload_lines += 1;
        self.search = None;
    }

    /// Like [`append_payload`](Self::append_payload), but refuses a line
    /// that would take the payload past `max_bytes`. Once a line is refused
    /// every later line is refused too. Returns whether `line` was kept.
    pub fn append_payload_within(&mut self, line: &str, max_bytes: usize) -> bool {
        if self.payload_full {
            return false;
        }
        let separator = usize::from(self.payload_lines > 0);
        if self.payload.len() + separator + line.len() > max_bytes {
            self.payload_full = true;
            return false;
        }
        self.append_payload(line);
        true
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.search = None;
    }

    /// First writer wins: returns false (and changes nothing) when the
    /// field already holds a value or `value` is blank.
    pub fn fill_correlation(&mut self, field: CorrelationField, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let slot = self.correlation.slot(field);
        if slot.is_some() {
            return false;
        }
        *slot = Some(value.to_string());
        if field == CorrelationField::CallId {
            self.search = None;
        }
        true
    }

    /// Compute the lowercase shadow. Called once the entry is complete.
    pub fn seal(&mut self) {
        self.search = Some(SearchText {
            message: self.message.to_lowercase(),
            payload: self.payload.to_lowercase(),
            component: self.component.to_lowercase(),
            call_id: self.correlation.call_id.as_ref().map(|c| c.to_lowercase()),
        });
    }

    /// `None` until sealed, and again after any mutation of a shadowed field.
    pub fn search_text(&self) -> Option<&SearchText> {
        self.search.as_ref()
    }

    /// Case-insensitive substring match across the shadowed fields.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        match &self.search {
            Some(s) => {
                s.message.contains(&needle)
                    || s.payload.contains(&needle)
                    || s.component.contains(&needle)
                    || s.call_id.as_deref().is_some_and(|c| c.contains(&needle))
            }
            None => {
                self.message.to_lowercase().contains(&needle)
                    || self.payload.to_lowercase().contains(&needle)
                    || self.component.to_lowercase().contains(&needle)
                    || self.call_id().is_some_and(|c| c.to_lowercase().contains(&needle))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LogEntry {
        let ctx = EntryContext::new("pbx.log", "#ff8800");
        LogEntry::new(&ctx, 0, "raw", Level::Info, "Core", "Hello World")
    }

    #[test]
    fn test_level_from_label() {
        assert_eq!(Level::from_label("warning"), Level::Warn);
        assert_eq!(Level::from_label("FATAL"), Level::Error);
        assert_eq!(Level::from_label("trace"), Level::Debug);
        assert_eq!(Level::from_label("NOTICE"), Level::Info);
        assert_eq!(Level::from_label(" error "), Level::Error);
    }

    #[test]
    fn test_append_payload_joins_with_newline() {
        let mut e = entry();
        e.append_payload("first");
        e.append_payload("");
        e.append_payload("third");
        assert_eq!(e.payload(), "first\n\nthird");
        assert_eq!(e.payload_line_count(), 3);
    }

    #[test]
    fn test_payload_keeps_raw_lines() {
        let mut e = entry();
        e.append_payload("body  ");
        e.append_payload("");
        assert_eq!(e.payload(), "body  \n");
        assert_eq!(e.payload_line_count(), 2);
    }

    #[test]
    fn test_payload_limit_stops_appending() {
        let mut e = entry();
        assert!(e.append_payload_within("12345", 10));
        assert!(e.append_payload_within("6789", 10));
        assert_eq!(e.payload(), "12345\n6789");
        assert!(!e.append_payload_within("x", 10));
        // A later line that would fit is still refused.
        assert!(!e.append_payload_within("", 10));
        assert_eq!(e.payload(), "12345\n6789");
        assert_eq!(e.payload_line_count(), 2);
    }

    #[test]
    fn test_fill_correlation_first_writer_wins() {
        let mut e = entry();
        assert!(e.fill_correlation(CorrelationField::ReportId, "42"));
        assert!(!e.fill_correlation(CorrelationField::ReportId, "43"));
        assert!(!e.fill_correlation(CorrelationField::OperatorId, "  "));
        assert_eq!(e.correlation().report_id.as_deref(), Some("42"));
        assert_eq!(e.correlation().operator_id, None);
    }

    #[test]
    fn test_seal_and_invalidate_shadow() {
        let mut e = entry();
        e.fill_correlation(CorrelationField::CallId, "ABC@Host");
        e.seal();
        let shadow = e.search_text().unwrap();
        assert_eq!(shadow.message, "hello world");
        assert_eq!(shadow.component, "core");
        assert_eq!(shadow.call_id.as_deref(), Some("abc@host"));

        e.append_payload("More");
        assert!(e.search_text().is_none());
        e.seal();
        assert_eq!(e.search_text().unwrap().payload, "more");
    }

    #[test]
    fn test_display_message_prepends_annotations() {
        let mut e = entry();
        e.annotations.push(Annotation::Timeout);
        assert_eq!(e.display_message(), "[TIMEOUT] Hello World");
        assert_eq!(e.message(), "Hello World");
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let mut e = entry();
        e.append_payload("INVITE sip:bob@example.com");
        assert!(e.matches("invite"));
        e.seal();
        assert!(e.matches("BOB@EXAMPLE"));
        assert!(!e.matches("cancel"));
    }

    #[test]
    fn test_serializes_camel_case_with_flattened_ids() {
        let mut e = entry();
        e.fill_correlation(CorrelationField::ExtensionId, "1201");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["rawTimestamp"], "raw");
        assert_eq!(json["extensionId"], "1201");
        assert_eq!(json["sourceFile"], "pbx.log");
        assert_eq!(json["level"], "INFO");
        assert!(json.get("callId").is_none());
    }
}
