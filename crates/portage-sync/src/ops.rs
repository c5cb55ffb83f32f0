// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator-facing operations outside the poll cycle: explicit retry, late
//! attachment previews, delivery-status reporting, and target binding.

use portage_client::StatusReport;
use portage_core::clock::now_ms;
use portage_core::{BlobMeta, MessageKind, PortageError, StatusSnapshot, TargetInfo};
use tracing::info;

use crate::delivery::text_payload;
use crate::engine::SyncEngine;

/// Blob handed out for a late attachment preview.
#[derive(Debug)]
pub struct AttachmentData {
    pub att_id: String,
    pub bytes: Vec<u8>,
    pub sha256: Option<String>,
    pub meta: Option<BlobMeta>,
}

impl SyncEngine {
    /// Explicitly retry a stored message.
    ///
    /// Bundles are re-seeded as pending with fresh attempt counters and
    /// resolved immediately; text messages are re-delivered. Mutually
    /// exclusive with an in-flight cycle via the same single-flight guard.
    pub async fn retry_message(&self, message_id: &str) -> Result<(), PortageError> {
        if !self.try_acquire() {
            return Err(PortageError::Busy);
        }
        let result = self.run_retry(message_id).await;
        self.release();
        result
    }

    async fn run_retry(&self, message_id: &str) -> Result<(), PortageError> {
        let mut record = self.store().load().await?;
        let settings = record.settings.clone();

        match record.reseed_for_retry(message_id, now_ms())? {
            MessageKind::Bundle => {
                self.process_pending_bundles(&mut record, None, &settings)
                    .await;
            }
            MessageKind::Text => {
                // reseed_for_retry verified the message exists.
                let msg = record
                    .messages
                    .iter()
                    .find(|m| m.id == message_id)
                    .cloned()
                    .ok_or_else(|| PortageError::NotFound(format!("message {message_id}")))?;
                let payload = text_payload(&msg);
                let outcome = self.deliver_payload(&mut record, None, &payload).await;
                record.apply_delivery_outcome(message_id, &outcome, now_ms());
            }
        }

        let evicted = record.trim();
        for id in &evicted {
            self.resolver().cache().delete_for_message(id).await;
        }
        self.store().save(&record).await?;
        info!(message = message_id, "explicit retry processed");
        Ok(())
    }

    /// Serve attachment bytes for a late preview.
    ///
    /// Both cache tiers are consulted first; on a miss the descriptor is
    /// looked up in stored messages and fetched once. `NotFound` when
    /// neither the cache nor the message registry knows the pair.
    pub async fn attachment_data(
        &self,
        message_id: &str,
        att_id: &str,
    ) -> Result<AttachmentData, PortageError> {
        if let Some(blob) = self.resolver().cache().get(message_id, att_id).await {
            return Ok(AttachmentData {
                att_id: att_id.to_string(),
                bytes: blob.bytes,
                sha256: blob.sha256,
                meta: blob.meta,
            });
        }

        let record = self.store().load().await?;
        let attachment = record
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .and_then(|m| m.attachments.iter().find(|a| a.att_id == att_id))
            .cloned()
            .ok_or_else(|| PortageError::NotFound(format!("attachment {message_id}:{att_id}")))?;

        let (bytes, sha256, meta) = self
            .resolver()
            .fetch_for_preview(message_id, &attachment, record.settings.timeout())
            .await?;
        Ok(AttachmentData {
            att_id: att_id.to_string(),
            bytes,
            sha256,
            meta: Some(meta),
        })
    }

    /// Fold a collaborator-reported delivery status into the message record
    /// and forward it to the source.
    pub async fn report_delivery_status(&self, report: StatusReport) -> Result<(), PortageError> {
        let mut record = self.store().load().await?;
        let settings = record.settings.clone();

        if let (Some(message_id), Some(status)) =
            (report.message_id.as_deref(), report.status.as_deref())
        {
            record.apply_delivery(message_id, status, report.detail.clone(), now_ms());
            self.store().save(&record).await?;
        }

        self.client().send_status_report(&settings, &report).await
    }

    /// Bind (or with `None`, unbind) the delivery target. These fields are
    /// external-writable; everything else in the record belongs to the engine.
    pub async fn bind_target(&self, info: Option<TargetInfo>) -> Result<(), PortageError> {
        let mut record = self.store().load().await?;
        record.bind_target(info);
        self.store().save(&record).await
    }

    /// Current status snapshot for operator surfaces.
    pub async fn status(&self) -> Result<StatusSnapshot, PortageError> {
        Ok(self.store().load().await?.status)
    }

    /// The whole persisted record, read-only, for UI collaborators.
    pub async fn state(&self) -> Result<portage_store::StateRecord, PortageError> {
        self.store().load().await
    }
}
