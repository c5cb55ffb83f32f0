// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable id derivation for messages the source sent without one.

use sha2::{Digest, Sha256};

/// Short content fingerprint: the first 8 hex chars of the text's SHA-256.
fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..4])
}

/// Derive a stable message id from timestamp and content.
///
/// The same (text, ts) pair always derives the same id, so a source that
/// re-sends an id-less message still dedupes correctly.
pub fn derive_id(text: &str, ts: i64) -> String {
    format!("{ts}-{}", short_hash(text))
}
