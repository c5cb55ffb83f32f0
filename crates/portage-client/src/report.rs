// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status reports posted back to the source after delivery attempts.

use portage_core::STATUS_TEXT_PREFIX;
use serde_json::{Value, json};

/// A delivery-status report from a destination collaborator.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub status: Option<String>,
    pub site: Option<String>,
    pub detail: Option<String>,
    pub message_preview: Option<String>,
    pub message_id: Option<String>,
}

impl StatusReport {
    /// Wire body for the status POST.
    ///
    /// The `text` field doubles as a human-readable summary and as the
    /// echo-classification marker (see [`STATUS_TEXT_PREFIX`]).
    pub fn to_wire(&self, ts: i64) -> Value {
        let status = self.status.clone().unwrap_or_else(|| "unknown".to_string());
        let site = self.site.clone().unwrap_or_else(|| "Unknown".to_string());
        let detail = self.detail.clone().unwrap_or_default();
        let preview = self
            .message_preview
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let detail_suffix = if detail.is_empty() {
            String::new()
        } else {
            format!(" - {detail}")
        };
        let preview_suffix = if preview.is_empty() {
            String::new()
        } else {
            format!(" | {preview}")
        };

        json!({
            "type": "status",
            "status": status,
            "site": site,
            "detail": if detail.is_empty() { Value::Null } else { Value::String(detail) },
            "messagePreview": if preview.is_empty() { Value::Null } else { Value::String(preview.clone()) },
            "messageId": self.message_id,
            "ts": ts,
            "text": format!("{STATUS_TEXT_PREFIX} {status} {site}{detail_suffix}{preview_suffix}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_report_composes_text_with_detail_and_preview() {
        let report = StatusReport {
            status: Some("delivered".into()),
            site: Some("SiteX".into()),
            detail: Some("editor ready".into()),
            message_preview: Some("  hello world  ".into()),
            message_id: Some("m1".into()),
        };
        let wire = report.to_wire(1234);
        assert_eq!(wire["type"], "status");
        assert_eq!(wire["status"], "delivered");
        assert_eq!(wire["messageId"], "m1");
        assert_eq!(wire["ts"], 1234);
        assert_eq!(
            wire["text"],
            "[pt-status] delivered SiteX - editor ready | hello world"
        );
    }

    #[test]
    fn sparse_report_uses_placeholders_and_nulls() {
        let wire = StatusReport::default().to_wire(1);
        assert_eq!(wire["status"], "unknown");
        assert_eq!(wire["site"], "Unknown");
        assert_eq!(wire["detail"], Value::Null);
        assert_eq!(wire["messagePreview"], Value::Null);
        assert_eq!(wire["text"], "[pt-status] unknown Unknown");
    }
}
