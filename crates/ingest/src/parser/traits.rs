pub use super::model::{Dialect, EntryContext, Level, LogEntry};

/// A per-dialect state machine turning ordered lines into entries.
///
/// Lines must be pushed in file order. Each call returns the entry that the
/// line completed, if any; `finish` releases whatever is still open.
pub trait EntryBuilder: Send {
    fn push_line(&mut self, line: &str) -> Option<LogEntry>;

    /// End of input.
    fn finish(&mut self) -> Option<LogEntry>;

    fn dialect(&self) -> Dialect;

    /// Rows dropped as malformed so far.
    fn skipped_rows(&self) -> u64 {
        0
    }

    /// Continuation lines refused because the entry's payload was full.
    fn dropped_payload_lines(&self) -> u64 {
        0
    }
}
