// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Portage message bridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Portage configuration.
///
/// Loaded from TOML following the XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PortageConfig {
    /// Polled source endpoint settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Poll-loop cadence and message-history settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Attachment resolution policy.
    #[serde(default)]
    pub attachments: AttachmentConfig,

    /// Volatile blob-cache bounds.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Persistence paths.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Delivery-target wiring for the bundled webhook target.
    #[serde(default)]
    pub target: TargetConfig,
}

/// Source endpoint: where to poll and how long to wait.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request path, also used for keepalive acks and status reports.
    #[serde(default = "default_path")]
    pub path: String,

    /// Hard per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    63155
}

fn default_path() -> String {
    "/messages".to_string()
}

fn default_timeout_ms() -> u64 {
    3000
}

/// Poll cadence and bounded message history.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,

    /// Cap on the persisted message history (UI-facing).
    #[serde(default = "default_max_stored_messages")]
    pub max_stored_messages: usize,

    /// Whether the destination should auto-submit delivered text.
    /// Passed through to UI collaborators; the engine does not act on it.
    #[serde(default = "default_auto_send")]
    pub auto_send: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            max_stored_messages: default_max_stored_messages(),
            auto_send: default_auto_send(),
        }
    }
}

fn default_poll_secs() -> u64 {
    6
}

fn default_max_stored_messages() -> usize {
    5
}

fn default_auto_send() -> bool {
    true
}

/// Attachment resolution policy: retry budget, backoff, and pool size.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentConfig {
    /// Failed-fetch budget per attachment before `RETRY_EXHAUSTED`.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Minimum delay between resolution attempts for one bundle.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: i64,

    /// Concurrent downloads per bundle, regardless of bundle size.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            retry_delay_ms: default_retry_delay_ms(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_retry_limit() -> u32 {
    2
}

fn default_retry_delay_ms() -> i64 {
    1500
}

fn default_concurrency() -> usize {
    2
}

/// Volatile blob-cache bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Time-to-live for volatile entries in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: i64,

    /// Hard entry cap for the volatile tier.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_ms() -> i64 {
    5 * 60 * 1000
}

fn default_max_entries() -> usize {
    50
}

/// Persistence paths for the state document, blob store, and credential file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding `state.db`, `blobs.db`, and the credential file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("portage"))
        .unwrap_or_else(|| PathBuf::from("./portage-data"))
}

/// Wiring for the bundled webhook delivery target.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// URL the webhook target posts delivery payloads to. `None` leaves the
    /// engine unbound until an external bind or server auto-open hint.
    #[serde(default)]
    pub webhook_url: Option<String>,
}
