// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical types shared across the Portage workspace.
//!
//! These types define both the persisted state shape (consumed read-only by
//! UI collaborators) and the delivery payload handed to the bound target, so
//! all of them serialize with the wire's camelCase field names.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Marker prefix on status-report text, used both when composing outbound
/// status POSTs and when classifying echoed status traffic on the inbound
/// stream.
pub const STATUS_TEXT_PREFIX: &str = "[pt-status]";

/// Whether a message is plain text or carries attachment descriptors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Bundle,
}

/// Attachment-resolution state of a message.
///
/// `Pending` is only valid while the message is a bundle with unresolved
/// attachments; text messages are `Ok` from creation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResolveState {
    #[default]
    Ok,
    Pending,
    Error,
}

/// Coarse attachment classification used by the destination for rendering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// Destination-delivery outcome recorded on a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Accepted by the bound target.
    Queued,
    /// No target was bound when delivery was attempted.
    Unbound,
    /// The target rejected or dropped the send.
    SendFailed,
    /// Auto-provisioning a target failed.
    AutoOpenFailed,
    /// Delivered as a terminal bundle failure report.
    BundleError,
}

/// Result of one delivery attempt, folded into message bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub state: DeliveryState,
    pub detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn queued() -> Self {
        Self {
            state: DeliveryState::Queued,
            detail: None,
        }
    }

    pub fn failed(state: DeliveryState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: Some(detail.into()),
        }
    }
}

/// Opaque synchronization watermark: the source may hand back a number or a
/// string, and we echo it verbatim in the next `since` query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Number(n) => write!(f, "{n}"),
            Cursor::Text(s) => f.write_str(s),
        }
    }
}

/// How to retrieve an attachment's bytes, as dictated by the source.
///
/// The URL is the only required field; a descriptor without one never
/// survives normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSpec {
    pub url: String,
    #[serde(default = "default_fetch_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

fn default_fetch_method() -> String {
    "GET".to_string()
}

/// An attachment descriptor carried by a bundle message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub att_id: String,
    pub kind: AttachmentKind,
    pub filename: String,
    pub mime: String,
    pub size: Option<u64>,
    pub fetch: FetchSpec,
}

/// An attachment resolved to bytes, ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAttachment {
    pub att_id: String,
    pub kind: AttachmentKind,
    pub filename: String,
    pub mime: String,
    pub size: Option<u64>,
    pub bytes: Vec<u8>,
    pub sha256: Option<String>,
}

/// A classified per-attachment resolution failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentFailure {
    pub att_id: Option<String>,
    pub message: String,
    pub code: String,
    pub retryable: bool,
}

/// Cached-blob metadata kept alongside the bytes for late previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    pub att_id: String,
    pub filename: String,
    pub mime: String,
    pub size: Option<u64>,
    pub kind: AttachmentKind,
}

impl BlobMeta {
    pub fn from_attachment(att: &Attachment) -> Self {
        Self {
            att_id: att.att_id.clone(),
            filename: att.filename.clone(),
            mime: att.mime.clone(),
            size: att.size,
            kind: att.kind,
        }
    }
}

/// A canonical message record as persisted in state and shown to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub ts: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Opaque original payload, kept as a display fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    #[serde(default)]
    pub status: ResolveState,
    #[serde(default)]
    pub errors: Vec<AttachmentFailure>,
    /// Destination-delivery outcome. Engine-produced values are the
    /// [`DeliveryState`] strings; collaborators may report their own codes.
    #[serde(default)]
    pub delivery_status: Option<String>,
    #[serde(default)]
    pub delivery_detail: Option<String>,
    #[serde(default)]
    pub delivery_updated_at: Option<i64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub created_at: i64,
}

/// A bundle awaiting attachment resolution, retried across cycles.
///
/// Owned exclusively by the state record; the synchronizer reads and writes
/// it only through store operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBundle {
    pub id: String,
    pub ts: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
    /// Failed-attempt count per attachment id; successful fetches do not count.
    #[serde(default)]
    pub attempts: HashMap<String, u32>,
    #[serde(default)]
    pub errors: Vec<AttachmentFailure>,
    pub created_at: i64,
    #[serde(default)]
    pub last_attempt_at: i64,
}

/// Runtime-writable synchronization settings, persisted inside the state
/// record and seeded from configuration on first run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub poll_secs: u64,
    pub timeout_ms: u64,
    pub auto_send: bool,
    pub max_stored_messages: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 63155,
            path: "/messages".to_string(),
            poll_secs: 6,
            timeout_ms: 3000,
            auto_send: true,
            max_stored_messages: 5,
        }
    }
}

impl SyncSettings {
    /// Endpoint URL for both polls and control POSTs.
    pub fn endpoint_url(&self) -> String {
        let path = self.path.trim();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        format!("http://{}:{}{}", self.host.trim(), self.port, path)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

/// Connectivity and poll bookkeeping surfaced to operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub last_poll_at: Option<i64>,
    pub last_success_at: Option<i64>,
    pub last_error: Option<String>,
    pub connected: bool,
    pub last_keepalive_at: Option<i64>,
}

/// Side-channel configuration the source may attach to a poll response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// URL the engine may ask the collaborator to provision a target from
    /// when no target is bound.
    #[serde(default)]
    pub auto_open_target_url: Option<String>,
}

/// Identity of the currently bound delivery target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// An attachment as shipped inside a delivery payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttachment {
    pub att_id: String,
    pub filename: String,
    pub mime: String,
    pub size: Option<u64>,
    pub kind: AttachmentKind,
    pub bytes: Option<Vec<u8>>,
    pub sha256: Option<String>,
}

impl PayloadAttachment {
    pub fn from_resolved(res: &ResolvedAttachment) -> Self {
        Self {
            att_id: res.att_id.clone(),
            filename: res.filename.clone(),
            mime: res.mime.clone(),
            size: res.size,
            kind: res.kind,
            bytes: Some(res.bytes.clone()),
            sha256: res.sha256.clone(),
        }
    }
}

/// The payload handed to the bound delivery target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardPayload {
    pub id: String,
    pub ts: i64,
    pub text: String,
    pub attachments: Vec<PayloadAttachment>,
    pub status: ResolveState,
    pub errors: Vec<AttachmentFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrips_number_and_string() {
        let n: Cursor = serde_json::from_str("1712000000123").unwrap();
        assert_eq!(n, Cursor::Number(1712000000123));
        assert_eq!(n.to_string(), "1712000000123");

        let s: Cursor = serde_json::from_str(r#""abc-42""#).unwrap();
        assert_eq!(s, Cursor::Text("abc-42".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), r#""abc-42""#);
    }

    #[test]
    fn message_serializes_with_wire_field_names() {
        let msg = Message {
            id: "m1".into(),
            ts: 42,
            text: "hi".into(),
            kind: MessageKind::Text,
            attachments: vec![],
            raw: None,
            status: ResolveState::Ok,
            errors: vec![],
            delivery_status: Some(DeliveryState::SendFailed.to_string()),
            delivery_detail: None,
            delivery_updated_at: Some(43),
            retry_count: 0,
            created_at: 42,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["deliveryStatus"], "send_failed");
        assert_eq!(json["deliveryUpdatedAt"], 43);
        assert!(json.get("raw").is_none());
    }

    #[test]
    fn fetch_spec_defaults_method_and_headers() {
        let spec: FetchSpec =
            serde_json::from_str(r#"{"url":"http://example.test/a"}"#).unwrap();
        assert_eq!(spec.method, "GET");
        assert!(spec.headers.is_empty());
        assert!(spec.expires_at.is_none());
    }

    #[test]
    fn delivery_state_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&DeliveryState::AutoOpenFailed).unwrap();
        assert_eq!(json, r#""auto_open_failed""#);
        assert_eq!(DeliveryState::Unbound.to_string(), "unbound");
    }
}
