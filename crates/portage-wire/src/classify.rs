// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-traffic classification.
//!
//! Keepalives and status echoes ride the same stream as real messages; the
//! synchronizer acknowledges the former and ignores the latter, and neither
//! is stored or delivered.

use portage_core::{Message, STATUS_TEXT_PREFIX};

/// True for keepalive probes the source expects an acknowledgement for.
pub fn is_keepalive(msg: &Message) -> bool {
    if msg.text.trim() == "keepalive" {
        return true;
    }
    raw_type(msg) == Some("keepalive")
}

/// True for our own status reports echoed back by the source.
pub fn is_status_echo(msg: &Message) -> bool {
    if raw_type(msg) == Some("status") {
        return true;
    }
    msg.text.trim().starts_with(STATUS_TEXT_PREFIX)
}

fn raw_type(msg: &Message) -> Option<&str> {
    msg.raw.as_ref()?.get("type")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::normalize_message;
    use serde_json::json;

    #[test]
    fn keepalive_by_text() {
        let msg = normalize_message(&json!({"text": "  keepalive "})).unwrap();
        assert!(is_keepalive(&msg));
    }

    #[test]
    fn keepalive_by_raw_type() {
        let msg = normalize_message(&json!({"type": "keepalive", "text": ""})).unwrap();
        assert!(is_keepalive(&msg));
    }

    #[test]
    fn ordinary_text_is_not_keepalive() {
        let msg = normalize_message(&json!({"text": "keepalive yourself"})).unwrap();
        assert!(!is_keepalive(&msg));
    }

    #[test]
    fn status_echo_by_raw_type() {
        let msg = normalize_message(&json!({"type": "status", "text": "whatever"})).unwrap();
        assert!(is_status_echo(&msg));
    }

    #[test]
    fn status_echo_by_text_prefix() {
        let msg = normalize_message(&json!({"text": "[pt-status] delivered SiteX"})).unwrap();
        assert!(is_status_echo(&msg));
    }

    #[test]
    fn regular_message_is_neither() {
        let msg = normalize_message(&json!({"text": "hello"})).unwrap();
        assert!(!is_keepalive(&msg));
        assert!(!is_status_echo(&msg));
    }
}
