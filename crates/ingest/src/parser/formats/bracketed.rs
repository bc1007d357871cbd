use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::model::{Annotation, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::parser::timestamp;
use crate::parser::traits::{Dialect, EntryBuilder, EntryContext, Level, LogEntry};

/// `[INFO] [01/02/2024, 10:00:00] [core]: message`
static LOCALE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[([A-Za-z]+)\]\s*\[(\d{1,2}/\d{1,2}/\d{4}),\s*(\d{1,2}:\d{2}:\d{2}(?:[.,]\d{1,9})?(?:\s*[AaPp][Mm])?)\]\s*\[([^\]]*)\]:\s?(.*)$",
    )
    .unwrap()
});

/// `[INFO] [2024-01-02 10:00:00,123] [core] message`
static ISO_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[([A-Za-z]+)\]\s*\[(\d{4}-\d{2}-\d{2})[T ](\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?)Z?\]\s*\[([^\]]*)\]\s?(.*)$",
    )
    .unwrap()
});

static TIMEOUT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[\s*time[\s_-]?out\s*\]").unwrap());

static RECOVERY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[\s*recover(?:y|ed)\s*\]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderShape {
    Locale,
    Iso,
}

struct Header<'a> {
    shape: HeaderShape,
    level: &'a str,
    date: &'a str,
    time: &'a str,
    component: &'a str,
    message: &'a str,
}

fn parse_header(line: &str) -> Option<Header<'_>> {
    let (shape, caps) = if let Some(caps) = LOCALE_HEADER.captures(line) {
        (HeaderShape::Locale, caps)
    } else {
        (HeaderShape::Iso, ISO_HEADER.captures(line)?)
    };

    let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
    Some(Header {
        shape,
        level: group(1),
        date: group(2),
        time: group(3),
        component: group(4),
        message: group(5),
    })
}

enum BuildState {
    NoCurrentEntry,
    AccumulatingPayload(LogEntry),
}

/// Builder for bracketed logs: a header line opens an entry, every following
/// non-header line is appended to its payload.
pub struct BracketedLogBuilder {
    ctx: EntryContext,
    state: BuildState,
    max_payload_bytes: usize,
    discarded_lines: u64,
    dropped_payload_lines: u64,
}

impl BracketedLogBuilder {
    pub fn new(ctx: EntryContext) -> Self {
        Self {
            ctx,
            state: BuildState::NoCurrentEntry,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            discarded_lines: 0,
            dropped_payload_lines: 0,
        }
    }

    pub fn with_payload_limit(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    /// Noise lines seen before the first header.
    pub fn discarded_lines(&self) -> u64 {
        self.discarded_lines
    }

    fn start_entry(&self, line: &str, header: Header<'_>) -> LogEntry {
        let raw_timestamp = match header.shape {
            HeaderShape::Locale => format!("{}, {}", header.date, header.time),
            HeaderShape::Iso => format!("{} {}", header.date, header.time),
        };

        // An embedded zone-qualified instant beats the zone-less header.
        let timestamp = timestamp::find_embedded(header.message)
            .map(|(at, _)| at)
            .or_else(|| match header.shape {
                HeaderShape::Locale => timestamp::from_locale_parts(header.date, header.time),
                HeaderShape::Iso => timestamp::from_iso_parts(header.date, header.time),
            })
            .unwrap_or_else(|| {
                tracing::trace!(raw = %raw_timestamp, "unparseable header timestamp, using ingestion time");
                timestamp::now_ms()
            });

        let mut entry = LogEntry::new(
            &self.ctx,
            timestamp,
            raw_timestamp,
            Level::from_label(header.level),
            header.component.trim(),
            header.message,
        );

        if TIMEOUT_TAG.is_match(line) {
            entry.annotations.push(Annotation::Timeout);
        }
        if RECOVERY_TAG.is_match(line) {
            entry.annotations.push(Annotation::Recovery);
        }
        entry
    }
}

impl EntryBuilder for BracketedLogBuilder {
    fn push_line(&mut self, line: &str) -> Option<LogEntry> {
        if let Some(header) = parse_header(line) {
            let next = self.start_entry(line, header);
            let previous = std::mem::replace(&mut self.state, BuildState::AccumulatingPayload(next));
            return match previous {
                BuildState::AccumulatingPayload(done) => Some(done),
                BuildState::NoCurrentEntry => None,
            };
        }

        match &mut self.state {
            BuildState::AccumulatingPayload(entry) => {
                if !entry.append_payload_within(line, self.max_payload_bytes) {
                    self.dropped_payload_lines += 1;
                }
            }
            BuildState::NoCurrentEntry => self.discarded_lines += 1,
        }
        None
    }

    fn finish(&mut self) -> Option<LogEntry> {
        match std::mem::replace(&mut self.state, BuildState::NoCurrentEntry) {
            BuildState::AccumulatingPayload(entry) => Some(entry),
            BuildState::NoCurrentEntry => None,
        }
    }

    fn dialect(&self) -> Dialect {
        Dialect::BracketedLog
    }

    fn dropped_payload_lines(&self) -> u64 {
        self.dropped_payload_lines
    }
}
