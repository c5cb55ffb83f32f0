// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP clients for the Portage message bridge.
//!
//! [`SourceClient`] talks to the polled source endpoint: bearer-authorized
//! GET/POST with hard per-request timeouts, keepalive acknowledgements,
//! status reports, and two-phase credential rotation.
//!
//! [`AttachmentClient`] performs descriptor-driven attachment fetches with
//! caller-supplied method/headers and no forced authorization.

pub mod fetch;
pub mod report;
pub mod source;

pub use fetch::{AttachmentClient, FetchedBlob};
pub use report::StatusReport;
pub use source::SourceClient;

use std::time::Duration;

use portage_core::PortageError;

/// Map a reqwest failure onto the transport/timeout taxonomy.
pub(crate) fn map_request_error(err: reqwest::Error, timeout: Duration) -> PortageError {
    if err.is_timeout() {
        PortageError::Timeout { duration: timeout }
    } else {
        PortageError::Transport {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
