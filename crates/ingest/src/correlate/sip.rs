//! SIP protocol extraction.
//!
//! Only surface parsing: method or status line, Call-ID, From/To and the
//! agent id some PBXs put in header parameters. No message validation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::{CorrelationField, LogEntry};

const PROTOCOL_MARKER: &str = "SIP/2.0";

static PROTOCOL_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bSIP\b").unwrap());

static RESPONSE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^SIP/2\.0\s+(\d{3})\s*(.*?)\s*$").unwrap());

static REQUEST_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]+)\s+\S+\s+SIP/2\.0\s*$").unwrap());

static KNOWN_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(INVITE|ACK|BYE|CANCEL|REGISTER|OPTIONS|PRACK|SUBSCRIBE|NOTIFY|PUBLISH|INFO|REFER|MESSAGE|UPDATE)\b")
        .unwrap()
});

static CALL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?mi)^\s*(?:call-id|i)\s*:\s*(\S+)").unwrap());

static FROM_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?mi)^\s*(?:from|f)\s*:\s*(.+?)\s*$").unwrap());

static TO_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?mi)^\s*(?:to|t)\s*:\s*(.+?)\s*$").unwrap());

static AGENT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)agentid=([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})").unwrap()
});

pub fn is_protocol_message(entry: &LogEntry) -> bool {
    entry.is_protocol_message
        || entry.payload().contains(PROTOCOL_MARKER)
        || PROTOCOL_NAME.is_match(entry.message())
}

/// Method (`INVITE`) or status (`200 OK`) of a start line.
pub fn start_line_method(line: &str) -> Option<String> {
    let line = line.trim();
    if let Some(caps) = RESPONSE_LINE.captures(line) {
        let reason = &caps[2];
        return Some(if reason.is_empty() {
            caps[1].to_string()
        } else {
            format!("{} {}", &caps[1], reason)
        });
    }
    if let Some(caps) = REQUEST_LINE.captures(line) {
        return Some(caps[1].to_string());
    }
    KNOWN_METHOD.captures(line).map(|caps| caps[1].to_string())
}

/// Mark the entry as a protocol message and fill what its text provides.
pub fn extract(entry: &mut LogEntry) {
    entry.is_protocol_message = true;

    if entry.protocol_method.is_none() {
        // First payload line; the message stands in when there is no payload.
        let start_line = entry
            .payload()
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_else(|| entry.message());
        entry.protocol_method = start_line_method(start_line);
    }

    let call_id = CALL_ID.captures(entry.payload()).map(|caps| caps[1].to_string());
    if let Some(call_id) = call_id {
        entry.fill_correlation(CorrelationField::CallId, &call_id);
    }

    if entry.sip_from.is_none() {
        entry.sip_from = FROM_HEADER.captures(entry.payload()).map(|caps| caps[1].to_string());
    }
    if entry.sip_to.is_none() {
        entry.sip_to = TO_HEADER.captures(entry.payload()).map(|caps| caps[1].to_string());
    }

    if entry.correlation().operator_id.is_none() {
        let agent = AGENT_ID
            .captures(entry.message())
            .or_else(|| AGENT_ID.captures(entry.payload()))
            .map(|caps| caps[1].to_string());
        if let Some(agent) = agent {
            entry.fill_correlation(CorrelationField::OperatorId, &agent);
        }
    }
}
