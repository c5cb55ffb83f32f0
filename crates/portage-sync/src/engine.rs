// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The poll-cycle state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use portage_cache::BlobCache;
use portage_client::{AttachmentClient, SourceClient};
use portage_config::PortageConfig;
use portage_core::clock::now_ms;
use portage_core::{
    DeliveryOutcome, DeliveryState, DeliveryTarget, Message, MessageKind, PayloadAttachment,
    PendingBundle, PortageError, ResolveState, ServerConfig, SyncSettings,
};
use portage_resolver::{BundleStatus, Resolver};
use portage_store::{FileCredentialStore, StateRecord, StateStore};
use portage_wire::{is_keepalive, is_status_echo, normalize_messages, parse_body, resolve_cursor};
use tracing::{debug, info, warn};

use crate::delivery::{bundle_payload, text_payload};

/// What a `poll_once` call did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A cycle ran (and may have recorded a failure in status).
    Completed(CycleSummary),
    /// Another cycle held the single-flight guard; nothing happened.
    AlreadyRunning,
}

/// Bookkeeping for one completed cycle.
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub connected: bool,
    /// Regular (non-control) messages in the response.
    pub fetched: usize,
    pub keepalives: usize,
    /// Payloads the bound target accepted this cycle.
    pub delivered: usize,
    /// Open pending bundles after the cycle.
    pub pending: usize,
    pub error: Option<String>,
}

/// Orchestrates fetch-normalize-dedupe-deliver-persist cycles.
///
/// There is exactly one state owner; the atomic flag below is the only
/// mutual-exclusion primitive, shared by cycles and explicit retries.
pub struct SyncEngine {
    client: SourceClient,
    resolver: Resolver,
    store: StateStore,
    target: Arc<dyn DeliveryTarget>,
    in_flight: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        client: SourceClient,
        resolver: Resolver,
        store: StateStore,
        target: Arc<dyn DeliveryTarget>,
    ) -> Self {
        Self {
            client,
            resolver,
            store,
            target,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Build a fully wired engine from configuration: file credential store,
    /// SQLite state and blob stores under `data_dir`, and the given target.
    pub async fn open(
        config: &PortageConfig,
        target: Arc<dyn DeliveryTarget>,
    ) -> Result<Self, PortageError> {
        let data_dir = &config.storage.data_dir;
        tokio_fs_create_dir_all(data_dir).await?;

        let credentials = Arc::new(FileCredentialStore::in_data_dir(data_dir));
        let client = SourceClient::new(credentials)?;
        let cache = Arc::new(BlobCache::open(&data_dir.join("blobs.db"), &config.cache).await?);
        let resolver = Resolver::new(
            AttachmentClient::new()?,
            cache,
            config.attachments.clone(),
        );
        let store = StateStore::open(&data_dir.join("state.db")).await?;
        let record = store.ensure_defaults(config).await?;

        // Blobs orphaned by a crash between trim and cleanup die here.
        let swept = resolver
            .cache()
            .sweep_orphans(&record.valid_message_ids())
            .await;
        if swept > 0 {
            debug!(swept, "orphaned blobs removed at startup");
        }

        Ok(Self::new(client, resolver, store, target))
    }

    pub(crate) fn target(&self) -> &Arc<dyn DeliveryTarget> {
        &self.target
    }

    pub(crate) fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn store(&self) -> &StateStore {
        &self.store
    }

    pub(crate) fn client(&self) -> &SourceClient {
        &self.client
    }

    /// Acquire the single-flight guard. A concurrent caller gets `false`
    /// and must not run; it does not queue.
    pub(crate) fn try_acquire(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Run one synchronization cycle.
    ///
    /// Fetch/parse failures are recovered into status (`connected = false`)
    /// and the previous cursor survives untouched; only storage failures
    /// propagate as errors.
    pub async fn poll_once(&self) -> Result<CycleOutcome, PortageError> {
        if !self.try_acquire() {
            debug!("poll skipped: cycle already in flight");
            return Ok(CycleOutcome::AlreadyRunning);
        }
        let result = self.run_cycle().await;
        self.release();
        result.map(CycleOutcome::Completed)
    }

    async fn run_cycle(&self) -> Result<CycleSummary, PortageError> {
        let mut record = self.store.load().await?;
        let settings = record.settings.clone();

        let body = match self
            .client
            .fetch_messages(&settings, record.cursor.as_ref())
            .await
        {
            Ok(body) => body,
            Err(err) => {
                if let PortageError::Storage { .. } = err {
                    return Err(err);
                }
                warn!(error = %err, "poll fetch failed");
                let message = err.to_string();
                record.record_cycle_failure(message.clone(), now_ms());
                self.store.save(&record).await?;
                return Ok(CycleSummary {
                    connected: false,
                    error: Some(message),
                    ..CycleSummary::default()
                });
            }
        };

        let parsed = parse_body(&body);

        if let Some(new_token) = parsed.credential_update.as_deref() {
            if let Err(err) = self.client.apply_credential_update(&settings, new_token).await {
                warn!(error = %err, "credential rotation failed");
            }
        }

        let incoming = normalize_messages(&parsed.items);
        let keepalive_count = incoming.iter().filter(|m| is_keepalive(m)).count();
        let regular: Vec<&Message> = incoming
            .iter()
            .filter(|m| !is_keepalive(m) && !is_status_echo(m))
            .collect();

        if keepalive_count > 0 {
            if let Err(err) = self.client.send_keepalive_ack(&settings).await {
                warn!(error = %err, "keepalive ack failed");
            }
        }

        let server_config = parsed.config.clone();
        let mut delivered = 0usize;

        for msg in &regular {
            if record.in_ledger(&msg.id) {
                continue;
            }

            if msg.kind == MessageKind::Bundle && !msg.attachments.is_empty() {
                // First sighting seeds a pending bundle; a re-sent message
                // refreshes the open one rather than counting as delivered.
                record.seed_pending(msg, now_ms());
                let mut stored = (*msg).clone();
                stored.status = ResolveState::Pending;
                record.upsert_message(stored);
                record.set_resolution(&msg.id, ResolveState::Pending, vec![]);
                continue;
            }

            if record.is_duplicate(&msg.id) {
                continue;
            }

            record.upsert_message((*msg).clone());
            let payload = text_payload(msg);
            let outcome = self
                .deliver_payload(&mut record, server_config.as_ref(), &payload)
                .await;
            if outcome.state == DeliveryState::Queued {
                delivered += 1;
            }
            record.apply_delivery_outcome(&msg.id, &outcome, now_ms());
            record.mark_processed(&msg.id);
        }

        delivered += self
            .process_pending_bundles(&mut record, server_config.as_ref(), &settings)
            .await;

        record.cursor = resolve_cursor(
            None,
            parsed.cursor.as_ref(),
            &incoming,
            record.cursor.as_ref(),
        );

        let evicted = record.trim();
        for id in &evicted {
            self.resolver.cache().delete_for_message(id).await;
        }

        record.record_cycle_success(keepalive_count > 0, now_ms());
        let summary = CycleSummary {
            connected: true,
            fetched: regular.len(),
            keepalives: keepalive_count,
            delivered,
            pending: record.pending_bundles.len(),
            error: None,
        };
        self.store.save(&record).await?;

        debug!(
            fetched = summary.fetched,
            delivered = summary.delivered,
            pending = summary.pending,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Attempt resolution for every pending bundle whose retry delay has
    /// elapsed. Returns how many payloads the target accepted.
    pub(crate) async fn process_pending_bundles(
        &self,
        record: &mut StateRecord,
        server_config: Option<&ServerConfig>,
        settings: &SyncSettings,
    ) -> usize {
        let pending_ids: Vec<String> = record.pending_bundles.keys().cloned().collect();
        let mut delivered = 0usize;

        for id in pending_ids {
            let Some(entry) = record.pending_bundles.get(&id).cloned() else {
                continue;
            };
            if !self.resolver.should_attempt(&entry, now_ms()) {
                continue;
            }

            let resolution = self.resolver.resolve_bundle(&entry, settings.timeout()).await;
            let now = now_ms();

            match resolution.status {
                BundleStatus::Ok => {
                    let attachments: Vec<PayloadAttachment> = resolution
                        .attachments
                        .iter()
                        .map(PayloadAttachment::from_resolved)
                        .collect();
                    let payload =
                        bundle_payload(&entry, attachments, ResolveState::Ok, vec![]);

                    let stored = message_from_bundle(&entry);
                    record.upsert_message(stored);
                    record.set_resolution(&entry.id, ResolveState::Ok, vec![]);

                    let outcome = self
                        .deliver_payload(record, server_config, &payload)
                        .await;
                    if outcome.state == DeliveryState::Queued {
                        delivered += 1;
                    }
                    record.apply_delivery_outcome(&entry.id, &outcome, now);
                    record.mark_processed(&entry.id);
                    record.remove_pending(&entry.id);
                    info!(bundle = %entry.id, "bundle resolved and delivered");
                }
                BundleStatus::Retry => {
                    warn!(
                        bundle = %entry.id,
                        errors = resolution.errors.len(),
                        "bundle retry scheduled"
                    );
                    if let Some(open) = record.pending_bundles.get_mut(&id) {
                        open.attempts = resolution.attempts.clone();
                        open.errors = resolution.errors.clone();
                        open.last_attempt_at = now;
                    }
                    let stored = message_from_bundle(&entry);
                    record.upsert_message(stored);
                    record.set_resolution(&entry.id, ResolveState::Pending, resolution.errors);
                }
                BundleStatus::Error => {
                    warn!(bundle = %entry.id, errors = ?resolution.errors, "bundle failed");
                    let payload = bundle_payload(
                        &entry,
                        vec![],
                        ResolveState::Error,
                        resolution.errors.clone(),
                    );

                    let stored = message_from_bundle(&entry);
                    record.upsert_message(stored);
                    record.set_resolution(&entry.id, ResolveState::Error, resolution.errors);

                    let outcome = self
                        .deliver_payload(record, server_config, &payload)
                        .await;
                    if outcome.state == DeliveryState::Queued {
                        delivered += 1;
                    }
                    // The failure report went out (or tried to); the record
                    // keeps the terminal marker either way.
                    let outcome = DeliveryOutcome {
                        state: DeliveryState::BundleError,
                        detail: outcome.detail,
                    };
                    record.apply_delivery_outcome(&entry.id, &outcome, now);
                    record.mark_processed(&entry.id);
                    record.remove_pending(&entry.id);
                }
            }
        }

        delivered
    }
}

/// Message record mirroring a pending bundle's identity.
pub(crate) fn message_from_bundle(bundle: &PendingBundle) -> Message {
    Message {
        id: bundle.id.clone(),
        ts: bundle.ts,
        text: bundle.text.clone(),
        kind: bundle.kind,
        attachments: bundle.attachments.clone(),
        raw: None,
        status: ResolveState::Ok,
        errors: vec![],
        delivery_status: None,
        delivery_detail: None,
        delivery_updated_at: None,
        retry_count: 0,
        created_at: bundle.created_at,
    }
}

async fn tokio_fs_create_dir_all(path: &std::path::Path) -> Result<(), PortageError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| PortageError::Storage {
            source: Box::new(e),
        })
}
