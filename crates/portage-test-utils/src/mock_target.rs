// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery target for deterministic testing.
//!
//! `MockTarget` implements `DeliveryTarget` with captured payloads for
//! assertion and configurable failure modes for both `deliver` and
//! `open_target`.

use async_trait::async_trait;
use tokio::sync::Mutex;

use portage_core::{DeliveryTarget, ForwardPayload, PortageError, TargetInfo};

/// A delivery destination that records everything handed to it.
pub struct MockTarget {
    delivered: Mutex<Vec<(String, ForwardPayload)>>,
    deliver_failure: Mutex<Option<String>>,
    open_failure: Mutex<Option<String>>,
    opened: Mutex<Vec<String>>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            deliver_failure: Mutex::new(None),
            open_failure: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent `deliver` fail with the given reason.
    pub async fn fail_deliveries(&self, reason: &str) {
        *self.deliver_failure.lock().await = Some(reason.to_string());
    }

    /// Restore successful deliveries.
    pub async fn accept_deliveries(&self) {
        *self.deliver_failure.lock().await = None;
    }

    /// Make every subsequent `open_target` fail with the given reason.
    pub async fn fail_opens(&self, reason: &str) {
        *self.open_failure.lock().await = Some(reason.to_string());
    }

    /// All payloads delivered so far, with the target id each went to.
    pub async fn delivered(&self) -> Vec<(String, ForwardPayload)> {
        self.delivered.lock().await.clone()
    }

    pub async fn delivered_count(&self) -> usize {
        self.delivered.lock().await.len()
    }

    /// URLs `open_target` was asked to provision.
    pub async fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().await.clone()
    }
}

impl Default for MockTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryTarget for MockTarget {
    async fn deliver(
        &self,
        target_id: &str,
        payload: &ForwardPayload,
    ) -> Result<(), PortageError> {
        if let Some(reason) = self.deliver_failure.lock().await.clone() {
            return Err(PortageError::Delivery { reason });
        }
        self.delivered
            .lock()
            .await
            .push((target_id.to_string(), payload.clone()));
        Ok(())
    }

    async fn open_target(&self, url: &str) -> Result<TargetInfo, PortageError> {
        if let Some(reason) = self.open_failure.lock().await.clone() {
            return Err(PortageError::Delivery { reason });
        }
        self.opened.lock().await.push(url.to_string());
        Ok(TargetInfo {
            id: format!("mock-target-{}", uuid::Uuid::new_v4()),
            title: "Mock Target".to_string(),
            url: url.to_string(),
        })
    }
}
