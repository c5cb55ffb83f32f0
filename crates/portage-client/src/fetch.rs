// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Descriptor-driven attachment fetches.
//!
//! Attachments are retrieved from wherever the source points us, with the
//! descriptor's own method and headers. No bearer header is forced on these
//! requests; auth, if any, rides in the caller-supplied headers.

use std::time::Duration;

use portage_core::{FetchSpec, PortageError};
use reqwest::Method;
use tracing::debug;

use crate::map_request_error;

/// Bytes plus the content type the remote claimed.
#[derive(Debug, Clone)]
pub struct FetchedBlob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP client for attachment downloads.
#[derive(Clone)]
pub struct AttachmentClient {
    http: reqwest::Client,
}

impl AttachmentClient {
    pub fn new() -> Result<Self, PortageError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PortageError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Fetch one attachment per its descriptor.
    ///
    /// Non-2xx maps to `Http{status}` so the resolver can classify
    /// retryability; transport failures and timeouts keep their own variants.
    pub async fn fetch(
        &self,
        spec: &FetchSpec,
        timeout: Duration,
    ) -> Result<FetchedBlob, PortageError> {
        let method = Method::from_bytes(spec.method.as_bytes()).unwrap_or_else(|_| {
            debug!(method = %spec.method, "unknown fetch method, falling back to GET");
            Method::GET
        });

        let mut request = self.http.request(method, &spec.url).timeout(timeout);
        for (key, value) in &spec.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortageError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_request_error(e, timeout))?
            .to_vec();

        debug!(url = %spec.url, size = bytes.len(), "attachment fetched");
        Ok(FetchedBlob {
            bytes,
            content_type,
        })
    }
}
