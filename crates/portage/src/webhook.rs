// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook delivery target.
//!
//! The reference destination for headless deployments: payloads are POSTed
//! to the bound URL as JSON. The target id of a webhook binding is the URL
//! itself, so "provisioning" one is just answering with its identity.

use async_trait::async_trait;
use portage_core::{DeliveryTarget, ForwardPayload, PortageError, TargetInfo};
use tracing::debug;

pub struct WebhookTarget {
    http: reqwest::Client,
}

impl WebhookTarget {
    pub fn new() -> Result<Self, PortageError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PortageError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl DeliveryTarget for WebhookTarget {
    async fn deliver(
        &self,
        target_id: &str,
        payload: &ForwardPayload,
    ) -> Result<(), PortageError> {
        let response = self
            .http
            .post(target_id)
            .json(payload)
            .send()
            .await
            .map_err(|e| PortageError::Delivery {
                reason: format!("webhook unreachable: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortageError::Delivery {
                reason: format!("webhook answered HTTP {status}"),
            });
        }
        debug!(target = target_id, message = %payload.id, "payload posted to webhook");
        Ok(())
    }

    async fn open_target(&self, url: &str) -> Result<TargetInfo, PortageError> {
        Ok(TargetInfo {
            id: url.to_string(),
            title: "webhook".to_string(),
            url: url.to_string(),
        })
    }
}
