// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Portage message bridge.

use thiserror::Error;

/// The primary error type used across all Portage crates.
///
/// Cycle-level failures (`Transport`, `Timeout`, `Http`) are recovered by the
/// synchronizer into the persisted status record and never propagate past it.
#[derive(Debug, Error)]
pub enum PortageError {
    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// A request failed below the HTTP layer (connection refused, DNS, TLS).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A request exceeded its hard timeout.
    #[error("request timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The source endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Persistence backend errors (database open, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Attachment resolution failed with a classified code.
    #[error("attachment error ({code}): {message}")]
    Attachment {
        code: String,
        message: String,
        retryable: bool,
    },

    /// Delivery to the bound target failed.
    #[error("delivery failed: {reason}")]
    Delivery { reason: String },

    /// A requested record does not exist in any tier.
    #[error("not found: {0}")]
    NotFound(String),

    /// A synchronization cycle or retry is already running.
    #[error("another synchronization cycle is in flight")]
    Busy,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
