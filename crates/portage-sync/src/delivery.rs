// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery plumbing: payload construction and the bound-target wrapper.

use portage_core::{
    AttachmentFailure, DeliveryOutcome, DeliveryState, ForwardPayload, Message, PayloadAttachment,
    PendingBundle, ResolveState, ServerConfig,
};
use portage_store::StateRecord;
use tracing::{info, warn};

use crate::engine::SyncEngine;

/// Payload for a plain text message.
pub(crate) fn text_payload(msg: &Message) -> ForwardPayload {
    ForwardPayload {
        id: msg.id.clone(),
        ts: msg.ts,
        text: msg.text.clone(),
        attachments: vec![],
        status: ResolveState::Ok,
        errors: vec![],
    }
}

/// Payload for a bundle, resolved or failed.
pub(crate) fn bundle_payload(
    bundle: &PendingBundle,
    attachments: Vec<PayloadAttachment>,
    status: ResolveState,
    errors: Vec<AttachmentFailure>,
) -> ForwardPayload {
    ForwardPayload {
        id: bundle.id.clone(),
        ts: bundle.ts,
        text: bundle.text.clone(),
        attachments,
        status,
        errors,
    }
}

impl SyncEngine {
    /// Hand a payload to the bound target, auto-provisioning one first when
    /// the server config allows it.
    ///
    /// Never fails the cycle: every failure mode folds into an outcome the
    /// caller records as message-level delivery bookkeeping.
    pub(crate) async fn deliver_payload(
        &self,
        record: &mut StateRecord,
        server_config: Option<&ServerConfig>,
        payload: &ForwardPayload,
    ) -> DeliveryOutcome {
        if record.bound_target_id.is_none() {
            if let Some(url) = server_config.and_then(|c| c.auto_open_target_url.as_deref()) {
                match self.target().open_target(url).await {
                    Ok(info) => {
                        info!(target = %info.id, url, "auto-provisioned delivery target");
                        record.bind_target(Some(info));
                    }
                    Err(err) => {
                        warn!(error = %err, url, "target auto-open failed");
                        return DeliveryOutcome::failed(
                            DeliveryState::AutoOpenFailed,
                            err.to_string(),
                        );
                    }
                }
            }
        }

        let Some(target_id) = record.bound_target_id.clone() else {
            return DeliveryOutcome::failed(DeliveryState::Unbound, "no bound target");
        };

        match self.target().deliver(&target_id, payload).await {
            Ok(()) => DeliveryOutcome::queued(),
            Err(err) => {
                warn!(error = %err, target = %target_id, message = %payload.id, "delivery failed");
                DeliveryOutcome::failed(DeliveryState::SendFailed, err.to_string())
            }
        }
    }
}
