//! Free-text identifier patterns.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::{CorrelationField, LogEntry};

static REPORT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\breport\s*id\s*[:=]\s*(\d+)").unwrap());

static EXTENSION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bextension\s*id\s*[:=]\s*Optional\[(\d+)\]").unwrap());

/// Scan message and payload for ids the JSON step did not provide.
pub fn extract_identifiers(entry: &mut LogEntry) {
    let needs_report = entry.correlation().report_id.is_none();
    let needs_extension = entry.correlation().extension_id.is_none();
    if !needs_report && !needs_extension {
        return;
    }

    let text = format!("{}\n{}", entry.message(), entry.payload());

    if needs_report {
        if let Some(caps) = REPORT_ID.captures(&text) {
            entry.fill_correlation(CorrelationField::ReportId, &caps[1]);
        }
    }
    if needs_extension {
        if let Some(caps) = EXTENSION_ID.captures(&text) {
            entry.fill_correlation(CorrelationField::ExtensionId, &caps[1]);
        }
    }
}
