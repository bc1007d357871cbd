//! Correlate module — identifier extraction over assembled entries.
//!
//! Runs once per entry, after its builder finalized it and before it is
//! batched. Every step only fills fields that are still empty, so running
//! the enricher again never changes an entry.

pub mod json;
pub mod patterns;
pub mod sip;

use crate::parser::{CorrelationField, LogEntry};

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationEnricher;

impl CorrelationEnricher {
    pub fn new() -> Self {
        Self
    }

    /// Never fails: a sub-step that cannot read its input leaves its
    /// fields unset.
    pub fn enrich(&self, entry: &mut LogEntry) {
        if let Some(document) = json::parse_payload_object(entry.payload()) {
            json::extract_identifiers(&document, entry);
        }

        patterns::extract_identifiers(entry);
        derive_station(entry);

        if sip::is_protocol_message(entry) {
            sip::extract(entry);
        }
    }
}

/// Station id is the extension id minus its two-character prefix.
fn derive_station(entry: &mut LogEntry) {
    let station = entry
        .correlation()
        .extension_id
        .as_deref()
        .filter(|ext| ext.chars().count() > 2)
        .map(|ext| ext.chars().skip(2).collect::<String>());

    if let Some(station) = station {
        entry.fill_correlation(CorrelationField::StationId, &station);
    }
}
