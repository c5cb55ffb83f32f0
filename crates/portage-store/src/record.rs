// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The canonical state record and its merge/trim rules.
//!
//! All mutation helpers here are pure with respect to I/O; the synchronizer
//! loads a record, works on it in memory, and persists the result as one
//! snapshot through [`crate::StateStore`].

use std::collections::{HashMap, HashSet};

use portage_core::{
    AttachmentFailure, Cursor, DeliveryOutcome, Message, MessageKind, PendingBundle, PortageError,
    ResolveState, StatusSnapshot, SyncSettings, TargetInfo,
};
use serde::{Deserialize, Serialize};

/// Cap on open pending bundles; oldest by creation time are dropped.
pub const MAX_PENDING_BUNDLES: usize = 200;

/// Cap on the dedupe ledger; oldest by insertion order are dropped.
pub const MAX_RECENT_IDS: usize = 400;

/// The one persisted record everything hangs off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateRecord {
    pub cursor: Option<Cursor>,
    pub messages: Vec<Message>,
    pub pending_bundles: HashMap<String, PendingBundle>,
    /// Dedupe ledger: ids already delivered or enqueued, insertion-ordered.
    pub recent_message_ids: Vec<String>,
    pub status: StatusSnapshot,
    pub bound_target_id: Option<String>,
    pub bound_target_info: Option<TargetInfo>,
    pub settings: SyncSettings,
}

impl StateRecord {
    /// True when the id is already in the dedupe ledger.
    pub fn in_ledger(&self, id: &str) -> bool {
        self.recent_message_ids.iter().any(|known| known == id)
    }

    /// True when the id was already processed or is an open pending bundle.
    pub fn is_duplicate(&self, id: &str) -> bool {
        self.in_ledger(id) || self.pending_bundles.contains_key(id)
    }

    /// Append an id to the dedupe ledger (set semantics).
    pub fn mark_processed(&mut self, id: &str) {
        if !self.recent_message_ids.iter().any(|known| known == id) {
            self.recent_message_ids.push(id.to_string());
        }
    }

    /// Merge a message into the history by id.
    ///
    /// An existing record keeps its attachments and errors when the update
    /// omits them, keeps its first-seen time, and keeps its delivery
    /// bookkeeping unless the update carries newer values. Delivery and
    /// resolution are independent axes; only [`Self::apply_delivery`] is
    /// supposed to move the former.
    pub fn upsert_message(&mut self, update: Message) {
        let Some(existing) = self.messages.iter_mut().find(|m| m.id == update.id) else {
            self.messages.push(update);
            return;
        };

        let mut merged = update;
        if merged.attachments.is_empty() {
            merged.attachments = std::mem::take(&mut existing.attachments);
        }
        if merged.errors.is_empty() {
            merged.errors = std::mem::take(&mut existing.errors);
        }
        if merged.raw.is_none() {
            merged.raw = existing.raw.take();
        }
        if merged.delivery_status.is_none() {
            merged.delivery_status = existing.delivery_status.take();
            merged.delivery_detail = existing.delivery_detail.take();
            merged.delivery_updated_at = existing.delivery_updated_at;
        }
        merged.created_at = existing.created_at;
        merged.retry_count = merged.retry_count.max(existing.retry_count);
        *existing = merged;
    }

    /// Record a delivery outcome without touching resolution state.
    ///
    /// `status` is free text on purpose: engine outcomes use the
    /// `DeliveryState` strings, while destination collaborators may report
    /// their own codes through the same bookkeeping.
    pub fn apply_delivery(&mut self, message_id: &str, status: &str, detail: Option<String>, now: i64) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) {
            msg.delivery_status = Some(status.to_string());
            msg.delivery_detail = detail;
            msg.delivery_updated_at = Some(now);
        }
    }

    /// Apply an engine-produced delivery outcome.
    pub fn apply_delivery_outcome(&mut self, message_id: &str, outcome: &DeliveryOutcome, now: i64) {
        self.apply_delivery(message_id, &outcome.state.to_string(), outcome.detail.clone(), now);
    }

    /// Explicitly set a message's resolution state and error list.
    ///
    /// Unlike [`Self::upsert_message`]'s merge, this overwrites the error
    /// list even when empty: a bundle that finally resolves clears the
    /// failures accumulated by earlier passes.
    pub fn set_resolution(
        &mut self,
        message_id: &str,
        status: ResolveState,
        errors: Vec<AttachmentFailure>,
    ) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) {
            msg.status = status;
            msg.errors = errors;
        }
    }

    /// Seed a pending bundle for a newly seen bundle message, or refresh an
    /// open one: a re-sent message overwrites text/ts/attachments but keeps
    /// accumulated attempts, errors, and timing.
    pub fn seed_pending(&mut self, msg: &Message, now: i64) {
        match self.pending_bundles.get_mut(&msg.id) {
            Some(existing) => {
                existing.text = msg.text.clone();
                existing.ts = msg.ts;
                existing.kind = msg.kind;
                existing.attachments = msg.attachments.clone();
            }
            None => {
                self.pending_bundles.insert(
                    msg.id.clone(),
                    PendingBundle {
                        id: msg.id.clone(),
                        ts: msg.ts,
                        text: msg.text.clone(),
                        kind: msg.kind,
                        attachments: msg.attachments.clone(),
                        attempts: HashMap::new(),
                        errors: vec![],
                        created_at: now,
                        last_attempt_at: 0,
                    },
                );
            }
        }
    }

    pub fn remove_pending(&mut self, id: &str) {
        self.pending_bundles.remove(id);
    }

    /// Re-seed a message for an explicit retry.
    ///
    /// Bundles get a fresh pending entry with reset attempt counters and a
    /// cleared error list; text messages are just marked for re-delivery.
    /// Either way the retry counter advances.
    pub fn reseed_for_retry(&mut self, message_id: &str, now: i64) -> Result<MessageKind, PortageError> {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return Err(PortageError::NotFound(format!("message {message_id}")));
        };
        msg.retry_count += 1;

        if msg.kind == MessageKind::Bundle && !msg.attachments.is_empty() {
            msg.status = ResolveState::Pending;
            msg.errors.clear();
            let pending = PendingBundle {
                id: msg.id.clone(),
                ts: msg.ts,
                text: msg.text.clone(),
                kind: msg.kind,
                attachments: msg.attachments.clone(),
                attempts: HashMap::new(),
                errors: vec![],
                created_at: if msg.created_at > 0 { msg.created_at } else { now },
                last_attempt_at: 0,
            };
            self.pending_bundles.insert(message_id.to_string(), pending);
            Ok(MessageKind::Bundle)
        } else {
            Ok(MessageKind::Text)
        }
    }

    /// Enforce every bound on the record.
    ///
    /// Returns the ids of evicted messages so the caller can pair each one
    /// with a blob-cache cleanup.
    pub fn trim(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();

        let max_messages = self.settings.max_stored_messages;
        if self.messages.len() > max_messages {
            let excess = self.messages.len() - max_messages;
            for msg in self.messages.drain(..excess) {
                evicted.push(msg.id);
            }
        }

        if self.pending_bundles.len() > MAX_PENDING_BUNDLES {
            let mut by_age: Vec<(String, i64)> = self
                .pending_bundles
                .iter()
                .map(|(id, b)| (id.clone(), b.created_at))
                .collect();
            by_age.sort_by_key(|(_, created_at)| *created_at);
            let excess = self.pending_bundles.len() - MAX_PENDING_BUNDLES;
            for (id, _) in by_age.into_iter().take(excess) {
                self.pending_bundles.remove(&id);
            }
        }

        if self.recent_message_ids.len() > MAX_RECENT_IDS {
            let excess = self.recent_message_ids.len() - MAX_RECENT_IDS;
            self.recent_message_ids.drain(..excess);
        }

        evicted
    }

    /// Message ids whose blobs are still referenced.
    pub fn valid_message_ids(&self) -> HashSet<String> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }

    /// Fold a failed cycle into status: connectivity drops, the error is
    /// surfaced, and everything else (cursor included) stays untouched.
    pub fn record_cycle_failure(&mut self, error: String, now: i64) {
        self.status.last_poll_at = Some(now);
        self.status.last_error = Some(error);
        self.status.connected = false;
    }

    /// Fold a successful cycle into status.
    pub fn record_cycle_success(&mut self, saw_keepalive: bool, now: i64) {
        self.status.last_poll_at = Some(now);
        self.status.last_success_at = Some(now);
        self.status.last_error = None;
        self.status.connected = true;
        if saw_keepalive {
            self.status.last_keepalive_at = Some(now);
        }
    }

    /// Bind or unbind the delivery target. External collaborators own this.
    pub fn bind_target(&mut self, info: Option<TargetInfo>) {
        match info {
            Some(info) => {
                self.bound_target_id = Some(info.id.clone());
                self.bound_target_info = Some(info);
            }
            None => {
                self.bound_target_id = None;
                self.bound_target_info = None;
            }
        }
    }
}
