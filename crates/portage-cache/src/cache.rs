// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The composed two-tier cache the resolver and synchronizer talk to.

use std::collections::HashSet;
use std::path::Path;

use portage_config::model::CacheConfig;
use portage_core::clock::now_ms;
use portage_core::{BlobMeta, PortageError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::persistent::PersistentBlobs;
use crate::volatile::{VolatileCache, VolatileEntry};

/// A blob served from either tier.
#[derive(Debug, Clone)]
pub struct CachedBlob {
    pub bytes: Vec<u8>,
    pub sha256: Option<String>,
    pub meta: Option<BlobMeta>,
}

/// Two-tier cache: volatile map in front, durable SQLite behind.
pub struct BlobCache {
    volatile: Mutex<VolatileCache>,
    persistent: PersistentBlobs,
}

impl BlobCache {
    pub async fn open(path: &Path, config: &CacheConfig) -> Result<Self, PortageError> {
        Ok(Self {
            volatile: Mutex::new(VolatileCache::new(config.ttl_ms, config.max_entries)),
            persistent: PersistentBlobs::open(path).await?,
        })
    }

    /// Look up a blob: volatile tier first, then the persistent tier with
    /// volatile rehydration on hit. Storage trouble degrades to a miss.
    pub async fn get(&self, message_id: &str, att_id: &str) -> Option<CachedBlob> {
        let now = now_ms();
        {
            let mut volatile = self.volatile.lock().await;
            if let Some(entry) = volatile.get(message_id, att_id, now) {
                return Some(CachedBlob {
                    bytes: entry.bytes.clone(),
                    sha256: entry.sha256.clone(),
                    meta: entry.meta.clone(),
                });
            }
        }

        match self.persistent.load(message_id, att_id).await {
            Ok(Some(blob)) => {
                let mut volatile = self.volatile.lock().await;
                volatile.insert(
                    message_id,
                    att_id,
                    VolatileEntry {
                        bytes: blob.bytes.clone(),
                        sha256: blob.sha256.clone(),
                        stored_at: blob.stored_at,
                        meta: None,
                    },
                    now,
                );
                debug!(message_id, att_id, "blob rehydrated from persistent tier");
                Some(CachedBlob {
                    bytes: blob.bytes,
                    sha256: blob.sha256,
                    meta: None,
                })
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, message_id, att_id, "persistent blob read failed");
                None
            }
        }
    }

    /// Store a blob in both tiers. The persistent write is best-effort.
    pub async fn put(
        &self,
        message_id: &str,
        att_id: &str,
        bytes: Vec<u8>,
        sha256: Option<String>,
        meta: BlobMeta,
    ) {
        let now = now_ms();
        {
            let mut volatile = self.volatile.lock().await;
            volatile.insert(
                message_id,
                att_id,
                VolatileEntry {
                    bytes: bytes.clone(),
                    sha256: sha256.clone(),
                    stored_at: now,
                    meta: Some(meta),
                },
                now,
            );
        }

        if let Err(err) = self
            .persistent
            .store(message_id, att_id, bytes, sha256, now)
            .await
        {
            warn!(error = %err, message_id, att_id, "persistent blob write failed");
        }
    }

    /// Remove every blob for a message from both tiers.
    ///
    /// Called whenever the message itself is evicted from state history.
    pub async fn delete_for_message(&self, message_id: &str) {
        self.volatile.lock().await.remove_message(message_id);
        match self.persistent.delete_for_message(message_id).await {
            Ok(deleted) if deleted > 0 => {
                debug!(message_id, deleted, "blobs removed for evicted message");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, message_id, "blob cleanup failed"),
        }
    }

    /// Drop blobs for messages no longer present in state, both tiers.
    pub async fn sweep_orphans(&self, valid_message_ids: &HashSet<String>) -> usize {
        self.volatile.lock().await.retain_messages(valid_message_ids);
        match self.persistent.sweep_orphans(valid_message_ids).await {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!(error = %err, "orphan sweep failed");
                0
            }
        }
    }
}
