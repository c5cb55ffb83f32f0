// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-stage response parsing: split a raw body into message-like items
//! plus the envelope side channels (cursor, server config, credential
//! rotation).

use portage_core::{Cursor, ServerConfig};
use serde_json::Value;

/// Outcome of parsing one poll-response body.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    /// Message-like items, not yet normalized.
    pub items: Vec<Value>,
    /// Cursor declared by the response envelope, if any.
    pub cursor: Option<Cursor>,
    /// Side-channel server configuration, if any.
    pub config: Option<ServerConfig>,
    /// New bearer token the server wants us to rotate to, if any.
    pub credential_update: Option<String>,
}

/// Parse a response body into items plus envelope side channels.
///
/// Accepted shapes:
/// - empty or plain text: zero or one synthetic text item
/// - bare JSON array: each element is an item
/// - object with a `messages` array: items plus optional cursor/config
/// - any other JSON object: wrapped whole as a single opaque item
///
/// Parsing never fails; an unparseable body degrades to plain text.
pub fn parse_body(raw: &str) -> ParsedResponse {
    let Some(parsed) = parse_maybe_json(raw) else {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ParsedResponse::default();
        }
        return ParsedResponse {
            items: vec![Value::String(trimmed.to_string())],
            ..ParsedResponse::default()
        };
    };

    match parsed {
        Value::Array(items) => ParsedResponse {
            items,
            ..ParsedResponse::default()
        },
        Value::Object(ref obj) => {
            let config = obj
                .get("config")
                .cloned()
                .and_then(|v| serde_json::from_value::<ServerConfig>(v).ok());
            let credential_update = obj
                .get("credentialUpdate")
                .and_then(Value::as_str)
                .map(str::to_string);
            let cursor = declared_cursor(obj);

            let items = match obj.get("messages") {
                Some(Value::Array(messages)) => messages.clone(),
                // Single message-like object, or an unrecognized shape kept
                // whole so the raw payload stays visible downstream.
                _ => vec![parsed.clone()],
            };

            ParsedResponse {
                items,
                cursor,
                config,
                credential_update,
            }
        }
        other => ParsedResponse {
            items: vec![other],
            ..ParsedResponse::default()
        },
    }
}

/// Attempt JSON parsing only for bodies that plausibly are JSON; the source
/// is allowed to answer with bare text.
fn parse_maybe_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Envelope-declared cursor, checked in documented priority order.
pub(crate) fn declared_cursor(obj: &serde_json::Map<String, Value>) -> Option<Cursor> {
    for key in ["nextCursor", "cursor", "next"] {
        if let Some(cursor) = obj.get(key).and_then(value_to_cursor) {
            return Some(cursor);
        }
    }
    None
}

/// Coerce a JSON value into a cursor; null and empty strings do not count.
pub(crate) fn value_to_cursor(value: &Value) -> Option<Cursor> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Cursor::Number)
            .or_else(|| Some(Cursor::Text(n.to_string()))),
        Value::String(s) if !s.is_empty() => Some(Cursor::Text(s.clone())),
        _ => None,
    }
}
