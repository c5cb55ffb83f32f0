// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed persistence for the canonical state record.
//!
//! The record is stored as one JSON document row and always written whole,
//! giving every cycle snapshot semantics: a failed cycle leaves the previous
//! document untouched.

use std::path::Path;

use portage_config::PortageConfig;
use portage_core::{PortageError, SyncSettings};
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::record::StateRecord;

/// Convert tokio_rusqlite errors into PortageError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> PortageError {
    PortageError::Storage {
        source: Box::new(e),
    }
}

/// Single-document state store.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (and initialize) the state store at the given path.
    pub async fn open(path: &Path) -> Result<Self, PortageError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| storage_err(e.into()))?;
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS state (
                    id  INTEGER PRIMARY KEY CHECK (id = 1),
                    doc TEXT NOT NULL
                );",
            )?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;
        Ok(Self { conn })
    }

    /// Load the record, healing anything malformed back to defaults.
    ///
    /// A corrupt document is not fatal: the bridge starts over with a fresh
    /// record rather than refusing to run.
    pub async fn load(&self) -> Result<StateRecord, PortageError> {
        match self.load_raw().await? {
            Some(doc) => match serde_json::from_str(&doc) {
                Ok(record) => Ok(record),
                Err(err) => {
                    warn!(error = %err, "state document unreadable, resetting to defaults");
                    Ok(StateRecord::default())
                }
            },
            None => Ok(StateRecord::default()),
        }
    }

    /// Persist the whole record as one snapshot.
    pub async fn save(&self, record: &StateRecord) -> Result<(), PortageError> {
        let doc = serde_json::to_string(record).map_err(|e| PortageError::Storage {
            source: Box::new(e),
        })?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO state (id, doc) VALUES (1, ?1)",
                    params![doc],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Make sure a record exists, seeding settings from configuration on
    /// first run. Returns the current record.
    pub async fn ensure_defaults(&self, config: &PortageConfig) -> Result<StateRecord, PortageError> {
        match self.load_raw().await? {
            Some(_) => self.load().await,
            None => {
                let mut record = StateRecord::default();
                record.settings = settings_from_config(config);
                self.save(&record).await?;
                debug!("state record initialized from configuration");
                Ok(record)
            }
        }
    }

    async fn load_raw(&self) -> Result<Option<String>, PortageError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT doc FROM state WHERE id = 1")?;
                let mut rows = stmt.query([])?;
                let doc = match rows.next()? {
                    Some(row) => Some(row.get::<_, String>(0)?),
                    None => None,
                };
                Ok(doc)
            })
            .await
            .map_err(storage_err)
    }
}

/// Seed runtime settings from the static configuration.
pub fn settings_from_config(config: &PortageConfig) -> SyncSettings {
    SyncSettings {
        host: config.source.host.clone(),
        port: config.source.port,
        path: config.source.path.clone(),
        poll_secs: config.sync.poll_secs,
        timeout_ms: config.source.timeout_ms,
        auto_send: config.sync.auto_send,
        max_stored_messages: config.sync.max_stored_messages,
    }
}
