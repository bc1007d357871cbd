//! JSON payload identifiers.

use serde_json::{Map, Value};

use crate::parser::{CorrelationField, LogEntry};

const REPORT_KEYS: &[&str] = &["reportId", "report_id", "reportID"];
const OPERATOR_KEYS: &[&str] = &["recipientId", "recipient_id", "operatorId", "operator_id", "recipient"];
const EXTENSION_KEYS: &[&str] = &["extensionId", "extension_id", "extensionID", "extension"];

/// How deep nested objects are searched for identifier keys.
const MAX_DEPTH: usize = 2;

/// Parse the payload only when it is one complete JSON object.
pub fn parse_payload_object(payload: &str) -> Option<Value> {
    let trimmed = payload.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(e) => {
            tracing::trace!(error = %e, "payload looks like JSON but does not parse");
            None
        }
    }
}

/// Fill report/operator/extension ids from a JSON document.
pub fn extract_identifiers(document: &Value, entry: &mut LogEntry) {
    let Some(root) = document.as_object() else {
        return;
    };

    for (field, keys) in [
        (CorrelationField::ReportId, REPORT_KEYS),
        (CorrelationField::OperatorId, OPERATOR_KEYS),
        (CorrelationField::ExtensionId, EXTENSION_KEYS),
    ] {
        if let Some(value) = find_scalar(root, keys, 0) {
            entry.fill_correlation(field, &value);
        }
    }
}

/// Breadth-first: keys on this object beat keys on nested ones.
fn find_scalar(object: &Map<String, Value>, keys: &[&str], depth: usize) -> Option<String> {
    for key in keys {
        if let Some(text) = object.get(*key).and_then(scalar_text) {
            return Some(text);
        }
    }
    if depth >= MAX_DEPTH {
        return None;
    }
    object
        .values()
        .filter_map(Value::as_object)
        .find_map(|nested| find_scalar(nested, keys, depth + 1))
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => unwrap_optional(s.trim()).to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `Optional[123]` → `123`
fn unwrap_optional(s: &str) -> &str {
    s.strip_prefix("Optional[")
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(s)
}
