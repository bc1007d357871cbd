//! Call-trace export dialect.
//!
//! ```text
//! proto:UDP 2024-01-02T10:00:00.123 10.0.0.1:5060 ---> 10.0.0.2:5060
//! INVITE sip:bob@example.com SIP/2.0
//! Call-ID: a84b4c76e66710
//! ```
//!
//! Everything between two headers is the payload of one entry. `--->`
//! marks a message sent by the left-hand address (OUT), `<---` one it
//! received (IN).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::model::{Direction, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::parser::timestamp;
use crate::parser::traits::{Dialect, EntryBuilder, EntryContext, Level, LogEntry};

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^proto:(\S+)\s+(\S+(?:\s+\d{1,2}:\d{2}:\d{2}(?:[.,]\d+)?)?)\s+(\S+)\s+(--->|<---)\s+(\S+)\s*$").unwrap()
});

/// Longest first payload line kept in the message, in characters.
const MESSAGE_CHARS: usize = 120;

pub fn is_header(line: &str) -> bool {
    HEADER.is_match(line)
}

pub struct CallTraceBuilder {
    ctx: EntryContext,
    current: Option<LogEntry>,
    max_payload_bytes: usize,
    dropped_payload_lines: u64,
}

impl CallTraceBuilder {
    pub fn new(ctx: EntryContext) -> Self {
        Self {
            ctx,
            current: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            dropped_payload_lines: 0,
        }
    }

    pub fn with_payload_limit(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    fn start_group(&self, caps: &regex::Captures<'_>) -> LogEntry {
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        let raw_timestamp = group(2);
        let timestamp = timestamp::parse_flexible(raw_timestamp).unwrap_or_else(timestamp::now_ms);
        let direction = if group(4) == "--->" { Direction::Out } else { Direction::In };

        let mut entry = LogEntry::new(
            &self.ctx,
            timestamp,
            raw_timestamp,
            Level::Info,
            group(1).to_ascii_uppercase(),
            "",
        );
        entry.direction = Some(direction);
        entry.source_addr = Some(group(3).to_string());
        entry.dest_addr = Some(group(5).to_string());
        entry
    }
}

fn finalize(mut entry: LogEntry) -> LogEntry {
    let direction = entry.direction.map(|d| d.as_str()).unwrap_or("IN");
    let first_line = entry
        .payload()
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| truncate_chars(l, MESSAGE_CHARS));

    let message = match first_line {
        Some(line) => format!("[{}] {}", direction, line),
        None => format!(
            "[{}] {} -> {}",
            direction,
            entry.source_addr.as_deref().unwrap_or("?"),
            entry.dest_addr.as_deref().unwrap_or("?")
        ),
    };
    entry.set_message(message);
    entry
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

impl EntryBuilder for CallTraceBuilder {
    fn push_line(&mut self, line: &str) -> Option<LogEntry> {
        if let Some(caps) = HEADER.captures(line) {
            let next = self.start_group(&caps);
            return self.current.replace(next).map(finalize);
        }

        if let Some(entry) = self.current.as_mut() {
            // No leading blank lines inside a group.
            if line.trim().is_empty() && entry.payload_line_count() == 0 {
                return None;
            }
            if !entry.append_payload_within(line, self.max_payload_bytes) {
                self.dropped_payload_lines += 1;
            }
        }
        None
    }

    fn finish(&mut self) -> Option<LogEntry> {
        self.current.take().map(finalize)
    }

    fn dialect(&self) -> Dialect {
        Dialect::CallTraceExport
    }

    fn dropped_payload_lines(&self) -> u64 {
        self.dropped_payload_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<LogEntry> {
        let mut b = CallTraceBuilder::new(EntryContext::new("trace.txt", "red"));
        let mut out: Vec<LogEntry> = lines.iter().filter_map(|l| b.push_line(l)).collect();
        out.extend(b.finish());
        out
    }

    #[test]
    fn test_groups_between_headers() {
        let entries = run(&[
            "",
            "proto:UDP 2024-01-02T10:00:00.000 10.0.0.1:5060 ---> 10.0.0.2:5060",
            "",
            "INVITE sip:bob@example.com SIP/2.0",
            "Call-ID: abc",
            "",
            "v=0",
            "proto:UDP 2024-01-02T10:00:00.100 10.0.0.1:5060 <--- 10.0.0.2:5060",
            "SIP/2.0 100 Trying",
        ]);

        assert_eq!(entries.len(), 2);
        let invite = &entries[0];
        assert_eq!(invite.payload(), "INVITE sip:bob@example.com SIP/2.0\nCall-ID: abc\n\nv=0");
        assert_eq!(invite.message(), "[OUT] INVITE sip:bob@example.com SIP/2.0");
        assert_eq!(invite.direction, Some(Direction::Out));
        assert_eq!(invite.component(), "UDP");
        assert_eq!(invite.source_addr.as_deref(), Some("10.0.0.1:5060"));
        assert_eq!(invite.dest_addr.as_deref(), Some("10.0.0.2:5060"));
        assert_eq!(invite.timestamp, 1704189600000);
        assert_eq!(invite.level, Level::Info);

        let trying = &entries[1];
        assert_eq!(trying.direction, Some(Direction::In));
        assert_eq!(trying.message(), "[IN] SIP/2.0 100 Trying");
        assert_eq!(trying.timestamp, 1704189600100);
    }

    #[test]
    fn test_header_with_space_separated_time() {
        assert!(is_header("proto:TCP 2024/01/02 10:00:00.5 [::1]:5060 ---> 10.0.0.2:5061"));
        let entries = run(&["proto:tcp 2024/01/02 10:00:00.5 a:1 ---> b:2", "OPTIONS sip:x SIP/2.0"]);
        assert_eq!(entries[0].raw_timestamp, "2024/01/02 10:00:00.5");
        assert_eq!(entries[0].timestamp, 1704189600500);
        assert_eq!(entries[0].component(), "TCP");
    }

    #[test]
    fn test_lines_before_first_header_ignored() {
        let entries = run(&["noise", "", "proto:UDP 1704189600 a:1 ---> b:2", "BYE sip:x SIP/2.0"]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload(), "BYE sip:x SIP/2.0");
    }

    #[test]
    fn test_empty_group_message_uses_addresses() {
        // Only leading blanks, so nothing reaches the payload.
        let entries = run(&["proto:UDP 1704189600 a:1 <--- b:2", "", ""]);
        assert_eq!(entries[0].payload(), "");
        assert_eq!(entries[0].payload_line_count(), 0);
        assert_eq!(entries[0].message(), "[IN] a:1 -> b:2");
    }

    #[test]
    fn test_blank_lines_inside_group_kept() {
        let entries = run(&[
            "proto:UDP 1704189600 a:1 ---> b:2",
            "INVITE sip:x SIP/2.0",
            "",
            "proto:UDP 1704189601 a:1 <--- b:2",
            "SIP/2.0 100 Trying",
        ]);
        assert_eq!(entries[0].payload(), "INVITE sip:x SIP/2.0\n");
        assert_eq!(entries[0].message(), "[OUT] INVITE sip:x SIP/2.0");
        assert_eq!(entries[1].payload(), "SIP/2.0 100 Trying");
    }

    #[test]
    fn test_payload_limit_counts_dropped_lines() {
        let mut b = CallTraceBuilder::new(EntryContext::new("trace.txt", "red")).with_payload_limit(24);
        b.push_line("proto:UDP 1704189600 a:1 ---> b:2");
        b.push_line("INVITE sip:x SIP/2.0");
        b.push_line("Call-ID: 1");
        b.push_line("Via: x");
        let entry = b.finish().unwrap();
        assert_eq!(entry.payload(), "INVITE sip:x SIP/2.0");
        assert_eq!(entry.message(), "[OUT] INVITE sip:x SIP/2.0");
        assert_eq!(b.dropped_payload_lines(), 2);
    }

    #[test]
    fn test_long_first_line_truncated() {
        let long = "x".repeat(300);
        let header = "proto:UDP 1704189600 a:1 ---> b:2";
        let entries = run(&[header, &long]);
        assert_eq!(entries[0].message(), format!("[OUT] {}...", "x".repeat(120)));
        assert_eq!(entries[0].payload().len(), 300);
    }

    #[test]
    fn test_not_a_header() {
        assert!(!is_header("proto:UDP"));
        assert!(!is_header("proto:UDP 2024-01-02 a ==> b"));
        assert!(!is_header("INVITE sip:bob@example.com SIP/2.0"));
    }
}
