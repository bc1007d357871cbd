/// Log parsing: from raw bytes to structured entries
///
/// # Architecture
///
/// - `lines.rs`: chunk → line reassembly with a bounded buffer
/// - `detector.rs`: dialect detection from file name and content probe
/// - `traits.rs`: the `EntryBuilder` state-machine contract
/// - `formats/`: one builder per dialect, dispatched through `DialectBuilder`
/// - `timestamp.rs`: tolerant timestamp parsing with wall-clock fallback
/// - `model.rs`: `LogEntry` and its vocabulary types
///
/// # Safety Guarantees
///
/// - Bounded memory (line length cap, no whole-file buffering in the builders)
/// - Binary safety (lossy UTF-8 decoding, never an error)
/// - Malformed lines and rows are skipped or defaulted, never fatal

pub mod traits;
pub mod detector;
pub mod formats;
pub mod lines;
pub mod model;
pub mod timestamp;

// Re-export commonly used types
pub use traits::EntryBuilder;
pub use detector::DialectDetector;
pub use formats::DialectBuilder;
pub use lines::{split_lines, LineReassembler};
pub use model::{
    Annotation, Correlation, CorrelationField, Dialect, Direction, EntryContext, Level, LogEntry,
    SearchText, DEFAULT_MAX_PAYLOAD_BYTES,
};
