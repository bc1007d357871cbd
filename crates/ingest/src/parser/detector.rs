use std::path::Path;

use super::formats::call_trace;
use super::model::Dialect;

/// Lines of the probe inspected for a call-trace header.
const PROBE_LINES: usize = 200;

/// Picks the dialect of a file from its name and a content probe.
///
/// Rules, highest priority first:
/// 1. `.csv` extension → CSV-structured
/// 2. any probe line shaped like `proto:<t> <ts> <addr> ---> <addr>` → call-trace export
/// 3. everything else → bracketed log
///
/// Detection only reads the probe; callers replay the same bytes into the
/// builder afterwards.
pub struct DialectDetector;

impl DialectDetector {
    pub fn detect(filename: &str, probe: &[u8]) -> Dialect {
        let is_csv = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            return Dialect::CsvStructured;
        }

        let text = String::from_utf8_lossy(probe);
        if text
            .lines()
            .take(PROBE_LINES)
            .any(|line| call_trace::is_header(line.trim_end_matches('\r')))
        {
            return Dialect::CallTraceExport;
        }

        Dialect::BracketedLog
    }
}
