//! Individual dialect entry builders

pub mod bracketed;
pub mod structured;
pub mod call_trace;

pub use bracketed::BracketedLogBuilder;
pub use structured::CsvStructuredBuilder;
pub use call_trace::CallTraceBuilder;

use crate::parser::traits::{Dialect, EntryBuilder, EntryContext, LogEntry};

/// The builder for one file, chosen once from its detected [`Dialect`].
pub enum DialectBuilder {
    BracketedLog(BracketedLogBuilder),
    CsvStructured(CsvStructuredBuilder),
    CallTraceExport(CallTraceBuilder),
}

impl DialectBuilder {
    /// `max_payload_bytes` caps the payload of the accumulating dialects;
    /// a CSV row is already bounded by the line cap.
    pub fn new(dialect: Dialect, ctx: EntryContext, max_payload_bytes: usize) -> Self {
        match dialect {
            Dialect::BracketedLog => DialectBuilder::BracketedLog(
                BracketedLogBuilder::new(ctx).with_payload_limit(max_payload_bytes),
            ),
            Dialect::CsvStructured => DialectBuilder::CsvStructured(CsvStructuredBuilder::new(ctx)),
            Dialect::CallTraceExport => DialectBuilder::CallTraceExport(
                CallTraceBuilder::new(ctx).with_payload_limit(max_payload_bytes),
            ),
        }
    }
}

impl EntryBuilder for DialectBuilder {
    fn push_line(&mut self, line: &str) -> Option<LogEntry> {
        match self {
            DialectBuilder::BracketedLog(b) => b.push_line(line),
            DialectBuilder::CsvStructured(b) => b.push_line(line),
            DialectBuilder::CallTraceExport(b) => b.push_line(line),
        }
    }

    fn finish(&mut self) -> Option<LogEntry> {
        match self {
            DialectBuilder::BracketedLog(b) => b.finish(),
            DialectBuilder::CsvStructured(b) => b.finish(),
            DialectBuilder::CallTraceExport(b) => b.finish(),
        }
    }

    fn dialect(&self) -> Dialect {
        match self {
            DialectBuilder::BracketedLog(b) => b.dialect(),
            DialectBuilder::CsvStructured(b) => b.dialect(),
            DialectBuilder::CallTraceExport(b) => b.dialect(),
        }
    }

    fn skipped_rows(&self) -> u64 {
        match self {
            DialectBuilder::BracketedLog(b) => b.skipped_rows(),
            DialectBuilder::CsvStructured(b) => b.skipped_rows(),
            DialectBuilder::CallTraceExport(b) => b.skipped_rows(),
        }
    }

    fn dropped_payload_lines(&self) -> u64 {
        match self {
            DialectBuilder::BracketedLog(b) => b.dropped_payload_lines(),
            DialectBuilder::CsvStructured(b) => b.dropped_payload_lines(),
            DialectBuilder::CallTraceExport(b) => b.dropped_payload_lines(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_matches_dialect() {
        for dialect in [Dialect::BracketedLog, Dialect::CsvStructured, Dialect::CallTraceExport] {
            let builder = DialectBuilder::new(dialect, EntryContext::new("f", "t"), 1024);
            assert_eq!(builder.dialect(), dialect);
        }
    }
}
