// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery-target seam.
//!
//! The destination (a site adapter, a webhook, a test double) lives outside
//! the engine. The synchronizer only ever talks to it through this trait and
//! folds failures into per-message delivery bookkeeping.

use async_trait::async_trait;

use crate::error::PortageError;
use crate::types::{ForwardPayload, TargetInfo};

/// The single delivery destination currently designated to receive messages.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    /// Hand a payload to the bound target.
    ///
    /// An `Err` is folded into `delivery_status = send_failed`; it never
    /// aborts a synchronization cycle.
    async fn deliver(&self, target_id: &str, payload: &ForwardPayload)
    -> Result<(), PortageError>;

    /// Provision a fresh target from a server-supplied URL and return its
    /// identity so the engine can bind to it.
    async fn open_target(&self, url: &str) -> Result<TargetInfo, PortageError>;
}
