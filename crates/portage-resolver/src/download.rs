// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-attachment download with fast-fail gates and classification.

use std::time::Duration;

use portage_cache::BlobCache;
use portage_client::AttachmentClient;
use portage_core::clock::now_ms;
use portage_core::{Attachment, AttachmentFailure, BlobMeta, PortageError};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Stable failure codes surfaced in message errors and delivery payloads.
pub mod codes {
    /// Descriptor has no usable fetch URL.
    pub const INVALID_FETCH: &str = "INVALID_FETCH";
    /// The failed-fetch budget for this attachment is spent.
    pub const RETRY_EXHAUSTED: &str = "RETRY_EXHAUSTED";
    /// The descriptor's fetch authorization expired before we got to it.
    pub const EXPIRED: &str = "EXPIRED";
    /// The fetch exceeded its hard timeout.
    pub const FETCH_TIMEOUT: &str = "FETCH_TIMEOUT";
    /// Transport-level fetch failure.
    pub const FETCH_FAILED: &str = "FETCH_FAILED";
    /// A bundle with no attachment descriptors at all.
    pub const NO_ATTACHMENTS: &str = "NO_ATTACHMENTS";
}

/// Outcome of one download attempt.
///
/// `did_attempt` is true only when the network was actually touched; cache
/// hits and fast-fail gates never count against the retry budget, and
/// neither do successful fetches.
#[derive(Debug)]
pub(crate) enum DownloadOutcome {
    Ok {
        bytes: Vec<u8>,
        sha256: Option<String>,
    },
    Failed {
        error: AttachmentFailure,
        did_attempt: bool,
    },
}

pub(crate) async fn download_attachment(
    client: &AttachmentClient,
    cache: &BlobCache,
    message_id: &str,
    attachment: &Attachment,
    prior_attempts: u32,
    retry_limit: u32,
    timeout: Duration,
) -> DownloadOutcome {
    if attachment.fetch.url.is_empty() {
        return failed(attachment, codes::INVALID_FETCH, "missing fetch url", false, false);
    }

    if let Some(cached) = cache.get(message_id, &attachment.att_id).await {
        debug!(message_id, att_id = %attachment.att_id, "attachment served from cache");
        return DownloadOutcome::Ok {
            bytes: cached.bytes,
            sha256: cached.sha256,
        };
    }

    if prior_attempts >= retry_limit {
        return failed(attachment, codes::RETRY_EXHAUSTED, "retry limit reached", false, false);
    }

    if let Some(expires_at) = attachment.fetch.expires_at {
        if now_ms() > expires_at {
            return failed(
                attachment,
                codes::EXPIRED,
                "attachment authorization expired",
                false,
                false,
            );
        }
    }

    match client.fetch(&attachment.fetch, timeout).await {
        Ok(blob) => {
            check_mime(attachment, blob.content_type.as_deref());
            let sha256 = Some(sha256_hex(&blob.bytes));
            cache
                .put(
                    message_id,
                    &attachment.att_id,
                    blob.bytes.clone(),
                    sha256.clone(),
                    BlobMeta::from_attachment(attachment),
                )
                .await;
            DownloadOutcome::Ok {
                bytes: blob.bytes,
                sha256,
            }
        }
        Err(PortageError::Http { status, .. }) => failed(
            attachment,
            &format!("HTTP_{status}"),
            &format!("HTTP {status}"),
            is_retryable_status(status),
            true,
        ),
        Err(PortageError::Timeout { duration }) => failed(
            attachment,
            codes::FETCH_TIMEOUT,
            &format!("fetch timed out after {duration:?}"),
            true,
            true,
        ),
        Err(err) => failed(attachment, codes::FETCH_FAILED, &err.to_string(), true, true),
    }
}

/// A content-type disagreement is logged, never failed: sources routinely
/// mislabel attachments that still render fine.
fn check_mime(attachment: &Attachment, content_type: Option<&str>) {
    let declared = attachment.mime.to_ascii_lowercase();
    if declared.is_empty() {
        return;
    }
    if let Some(received) = content_type {
        if !received.contains(&declared) {
            warn!(
                att_id = %attachment.att_id,
                expected = %declared,
                received = %received,
                "attachment content-type mismatch"
            );
        }
    }
}

/// HTTP status retryability: 408, 429, and server errors are transient;
/// auth and gone answers are final.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    if matches!(status, 401 | 403 | 410) {
        return false;
    }
    status == 408 || status == 429 || status >= 500
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn failed(
    attachment: &Attachment,
    code: &str,
    message: &str,
    retryable: bool,
    did_attempt: bool,
) -> DownloadOutcome {
    DownloadOutcome::Failed {
        error: AttachmentFailure {
            att_id: Some(attachment.att_id.clone()),
            message: message.to_string(),
            code: code.to_string(),
            retryable,
        },
        did_attempt,
    }
}
