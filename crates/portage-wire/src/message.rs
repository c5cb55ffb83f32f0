// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Second-stage normalization: canonical [`Message`] and [`Attachment`]
//! records from loosely-shaped wire items.

use std::collections::BTreeMap;

use portage_core::clock::now_ms;
use portage_core::{Attachment, AttachmentKind, FetchSpec, Message, MessageKind, ResolveState};
use serde_json::Value;
use tracing::debug;

use crate::id::derive_id;

/// Field precedence for the message body. The source's re-senders disagree
/// on naming, so extraction follows this exact priority list; the first key
/// present wins even when its value is empty.
const TEXT_FIELD_PRECEDENCE: [&str; 4] = ["text", "message", "body", "content"];

/// Keys that may carry the source-assigned message id, in priority order.
const ID_FIELD_PRECEDENCE: [&str; 3] = ["id", "messageId", "uuid"];

/// Keys that may carry the source timestamp, in priority order.
const TS_FIELD_PRECEDENCE: [&str; 3] = ["ts", "time", "createdAt"];

/// Normalize a batch of wire items, dropping only nulls.
pub fn normalize_messages(items: &[Value]) -> Vec<Message> {
    items.iter().filter_map(normalize_message).collect()
}

/// Normalize one wire item into a canonical message.
///
/// Missing id derives from hash(text)+ts; missing ts defaults to now; the
/// kind is forced to `bundle` whenever attachments survive normalization,
/// even if the source said otherwise. Returns `None` only for JSON null.
pub fn normalize_message(item: &Value) -> Option<Message> {
    let now = now_ms();
    match item {
        Value::Null => None,
        Value::String(text) => Some(make_message(None, text.clone(), None, None, vec![], None, now)),
        Value::Object(obj) => {
            let id = string_field(obj, &ID_FIELD_PRECEDENCE);
            let ts = number_field(obj, &TS_FIELD_PRECEDENCE);
            let text = extract_text(obj);
            let attachments = obj
                .get("attachments")
                .and_then(Value::as_array)
                .map(|atts| atts.iter().filter_map(normalize_attachment).collect())
                .unwrap_or_default();
            let declared_kind = obj.get("type").and_then(Value::as_str).map(str::to_string);
            let raw = obj.get("raw").cloned().unwrap_or_else(|| item.clone());
            Some(make_message(id, text, ts, declared_kind, attachments, Some(raw), now))
        }
        // Numbers, booleans: stringify so nothing silently disappears.
        other => Some(make_message(None, other.to_string(), None, None, vec![], None, now)),
    }
}

/// Resolve the message body by the documented field precedence.
fn extract_text(obj: &serde_json::Map<String, Value>) -> String {
    for key in TEXT_FIELD_PRECEDENCE {
        match obj.get(key) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
        }
    }
    String::new()
}

fn make_message(
    id: Option<String>,
    text: String,
    ts: Option<i64>,
    declared_kind: Option<String>,
    attachments: Vec<Attachment>,
    raw: Option<Value>,
    now: i64,
) -> Message {
    let ts = ts.unwrap_or(now);
    let id = id.unwrap_or_else(|| derive_id(&text, ts));
    let kind = if !attachments.is_empty() || declared_kind.as_deref() == Some("bundle") {
        MessageKind::Bundle
    } else {
        MessageKind::Text
    };

    Message {
        id,
        ts,
        text,
        kind,
        attachments,
        raw,
        status: ResolveState::Ok,
        errors: vec![],
        delivery_status: None,
        delivery_detail: None,
        delivery_updated_at: None,
        retry_count: 0,
        created_at: now,
    }
}

/// Normalize one attachment descriptor.
///
/// A descriptor without a resolvable fetch URL is unusable and is dropped
/// here, before it can ever enter the canonical attachment list.
pub fn normalize_attachment(item: &Value) -> Option<Attachment> {
    let obj = item.as_object()?;
    let Some(fetch) = obj.get("fetch").and_then(Value::as_object) else {
        debug!("dropping attachment descriptor without fetch spec");
        return None;
    };
    let Some(url) = fetch.get("url").and_then(Value::as_str).map(str::to_string) else {
        debug!("dropping attachment descriptor without fetch url");
        return None;
    };

    let att_id = string_field(obj, &["attId", "id"]).unwrap_or_else(|| derive_id(&url, now_ms()));
    let kind = match obj.get("kind").and_then(Value::as_str) {
        Some("image") => AttachmentKind::Image,
        _ => AttachmentKind::File,
    };
    let filename = obj
        .get("filename")
        .and_then(Value::as_str)
        .or_else(|| obj.get("name").and_then(Value::as_str))
        .unwrap_or("attachment")
        .to_string();
    let mime = obj
        .get("mime")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let size = obj.get("size").and_then(to_u64);

    let method = fetch
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_uppercase();
    let headers = normalize_headers(fetch.get("headers"));
    let expires_at = fetch.get("expiresAt").and_then(to_i64);

    Some(Attachment {
        att_id,
        kind,
        filename,
        mime,
        size,
        fetch: FetchSpec {
            url,
            method,
            headers,
            expires_at,
        },
    })
}

/// Header values arrive as arbitrary JSON; coerce everything to strings.
fn normalize_headers(headers: Option<&Value>) -> BTreeMap<String, String> {
    let mut normalized = BTreeMap::new();
    let Some(Value::Object(map)) = headers else {
        return normalized;
    };
    for (key, value) in map {
        if key.is_empty() {
            continue;
        }
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        normalized.insert(key.clone(), value);
    }
    normalized
}

fn string_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => continue,
        }
    }
    None
}

fn number_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = obj.get(*key).and_then(to_i64) {
            return Some(n);
        }
    }
    None
}

/// Numeric coercion accepting both JSON numbers and numeric strings.
fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_item_becomes_text_message() {
        let msg = normalize_message(&json!("hello")).unwrap();
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(msg.attachments.is_empty());
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn null_item_is_dropped() {
        assert!(normalize_message(&Value::Null).is_none());
    }

    #[test]
    fn id_precedence_prefers_id_over_message_id_over_uuid() {
        let msg =
            normalize_message(&json!({"text":"x","uuid":"u","messageId":"m","id":"i"})).unwrap();
        assert_eq!(msg.id, "i");

        let msg = normalize_message(&json!({"text":"x","uuid":"u","messageId":"m"})).unwrap();
        assert_eq!(msg.id, "m");
    }

    #[test]
    fn numeric_id_is_coerced_to_string() {
        let msg = normalize_message(&json!({"text":"x","id":42})).unwrap();
        assert_eq!(msg.id, "42");
    }

    #[test]
    fn missing_id_derives_from_text_and_ts() {
        let msg = normalize_message(&json!({"text":"x","ts":500})).unwrap();
        assert_eq!(msg.id, derive_id("x", 500));
    }

    #[test]
    fn text_precedence_is_text_message_body_content() {
        let msg = normalize_message(&json!({"content":"d","body":"c","message":"b","text":"a"}))
            .unwrap();
        assert_eq!(msg.text, "a");

        let msg = normalize_message(&json!({"content":"d","body":"c"})).unwrap();
        assert_eq!(msg.text, "c");
    }

    #[test]
    fn first_present_text_field_wins_even_when_empty() {
        let msg = normalize_message(&json!({"text":"","message":"fallback"})).unwrap();
        assert_eq!(msg.text, "");
    }

    #[test]
    fn attachments_force_bundle_kind() {
        let msg = normalize_message(&json!({
            "text": "pic",
            "type": "text",
            "attachments": [{"attId": "a1", "fetch": {"url": "http://x.test/a"}}]
        }))
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Bundle);
        assert_eq!(msg.attachments.len(), 1);
    }

    #[test]
    fn attachment_without_url_is_dropped() {
        let msg = normalize_message(&json!({
            "text": "pic",
            "attachments": [
                {"attId": "a1"},
                {"attId": "a2", "fetch": {"url": "http://x.test/a2"}}
            ]
        }))
        .unwrap();
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].att_id, "a2");
    }

    #[test]
    fn message_with_only_urlless_attachments_is_text() {
        let msg = normalize_message(&json!({
            "text": "pic",
            "attachments": [{"attId": "a1", "fetch": {}}]
        }))
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn attachment_defaults_are_filled() {
        let att = normalize_attachment(&json!({"fetch": {"url": "http://x.test/f"}})).unwrap();
        assert_eq!(att.kind, AttachmentKind::File);
        assert_eq!(att.filename, "attachment");
        assert_eq!(att.mime, "");
        assert_eq!(att.fetch.method, "GET");
        assert!(att.size.is_none());
        assert!(att.fetch.expires_at.is_none());
    }

    #[test]
    fn attachment_fields_are_normalized() {
        let att = normalize_attachment(&json!({
            "attId": "a9",
            "kind": "image",
            "name": "photo.png",
            "mime": "image/png",
            "size": "2048",
            "fetch": {
                "url": "http://x.test/p",
                "method": "post",
                "headers": {"X-Num": 7, "X-Str": "v"},
                "expiresAt": 123456
            }
        }))
        .unwrap();
        assert_eq!(att.att_id, "a9");
        assert_eq!(att.kind, AttachmentKind::Image);
        assert_eq!(att.filename, "photo.png");
        assert_eq!(att.size, Some(2048));
        assert_eq!(att.fetch.method, "POST");
        assert_eq!(att.fetch.headers.get("X-Num").map(String::as_str), Some("7"));
        assert_eq!(att.fetch.headers.get("X-Str").map(String::as_str), Some("v"));
        assert_eq!(att.fetch.expires_at, Some(123456));
    }

    #[test]
    fn raw_preserves_the_original_item() {
        let item = json!({"weird": true, "type": "status"});
        let msg = normalize_message(&item).unwrap();
        assert_eq!(msg.raw, Some(item));
    }

    #[test]
    fn numeric_string_ts_is_accepted() {
        let msg = normalize_message(&json!({"text":"x","ts":"1700000000000"})).unwrap();
        assert_eq!(msg.ts, 1_700_000_000_000);
    }
}
