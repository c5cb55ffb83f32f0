// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent cache tier: a SQLite `blobs` table keyed `message_id:att_id`.
//!
//! All access goes through tokio-rusqlite's single background thread, so
//! writes are serialized without extra locking.

use std::collections::HashSet;
use std::path::Path;

use portage_core::PortageError;
use rusqlite::params;
use tokio_rusqlite::Connection;

/// Convert tokio_rusqlite errors into PortageError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> PortageError {
    PortageError::Storage {
        source: Box::new(e),
    }
}

/// A row loaded from the persistent tier.
#[derive(Debug, Clone)]
pub struct PersistentBlob {
    pub bytes: Vec<u8>,
    pub sha256: Option<String>,
    pub stored_at: i64,
}

/// Durable blob store mirroring successful attachment downloads.
pub struct PersistentBlobs {
    conn: Connection,
}

impl PersistentBlobs {
    /// Open (and initialize) the blob store at the given path.
    pub async fn open(path: &Path) -> Result<Self, PortageError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| storage_err(e.into()))?;
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS blobs (
                    key        TEXT PRIMARY KEY,
                    message_id TEXT NOT NULL,
                    att_id     TEXT NOT NULL,
                    bytes      BLOB NOT NULL,
                    sha256     TEXT,
                    stored_at  INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_blobs_message ON blobs (message_id);",
            )?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;
        Ok(Self { conn })
    }

    pub async fn store(
        &self,
        message_id: &str,
        att_id: &str,
        bytes: Vec<u8>,
        sha256: Option<String>,
        stored_at: i64,
    ) -> Result<(), PortageError> {
        let key = blob_key(message_id, att_id);
        let message_id = message_id.to_string();
        let att_id = att_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO blobs (key, message_id, att_id, bytes, sha256, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![key, message_id, att_id, bytes, sha256, stored_at],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    pub async fn load(
        &self,
        message_id: &str,
        att_id: &str,
    ) -> Result<Option<PersistentBlob>, PortageError> {
        let key = blob_key(message_id, att_id);
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT bytes, sha256, stored_at FROM blobs WHERE key = ?1")?;
                let mut rows = stmt.query(params![key])?;
                let blob = match rows.next()? {
                    Some(row) => Some(PersistentBlob {
                        bytes: row.get(0)?,
                        sha256: row.get(1)?,
                        stored_at: row.get(2)?,
                    }),
                    None => None,
                };
                Ok(blob)
            })
            .await
            .map_err(storage_err)
    }

    /// Delete every blob belonging to a message. Returns the rows removed.
    pub async fn delete_for_message(&self, message_id: &str) -> Result<usize, PortageError> {
        let message_id = message_id.to_string();
        self.conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM blobs WHERE message_id = ?1", params![message_id])?;
                Ok(deleted)
            })
            .await
            .map_err(storage_err)
    }

    /// Delete blobs whose message id is no longer in the valid set.
    ///
    /// Keeps the persistent tier bounded as state history is trimmed.
    pub async fn sweep_orphans(&self, valid: &HashSet<String>) -> Result<usize, PortageError> {
        let valid = valid.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT message_id FROM blobs")?;
                let known: Vec<String> = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut deleted = 0;
                for message_id in known.into_iter().filter(|id| !valid.contains(id)) {
                    deleted +=
                        conn.execute("DELETE FROM blobs WHERE message_id = ?1", params![message_id])?;
                }
                Ok(deleted)
            })
            .await
            .map_err(storage_err)
    }

    /// All composite keys currently stored, oldest first.
    pub async fn keys(&self) -> Result<Vec<String>, PortageError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key FROM blobs ORDER BY stored_at ASC")?;
                let keys: Vec<String> = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(storage_err)
    }
}

/// Composite persistent key for one attachment.
pub fn blob_key(message_id: &str, att_id: &str) -> String {
    format!("{message_id}:{att_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_store() -> (PersistentBlobs, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = PersistentBlobs::open(&dir.path().join("blobs.db"))
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn store_and_load_roundtrips() {
        let (store, _dir) = open_store().await;
        store
            .store("m1", "a1", vec![1, 2, 3], Some("abc".into()), 42)
            .await
            .unwrap();

        let blob = store.load("m1", "a1").await.unwrap().unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(blob.sha256.as_deref(), Some("abc"));
        assert_eq!(blob.stored_at, 42);

        assert!(store.load("m1", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_replaces_existing_key() {
        let (store, _dir) = open_store().await;
        store.store("m1", "a1", vec![1], None, 1).await.unwrap();
        store.store("m1", "a1", vec![2], None, 2).await.unwrap();
        let blob = store.load("m1", "a1").await.unwrap().unwrap();
        assert_eq!(blob.bytes, vec![2]);
        assert_eq!(store.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_for_message_removes_only_that_message() {
        let (store, _dir) = open_store().await;
        store.store("m1", "a1", vec![1], None, 1).await.unwrap();
        store.store("m1", "a2", vec![2], None, 2).await.unwrap();
        store.store("m2", "a1", vec![3], None, 3).await.unwrap();

        let deleted = store.delete_for_message("m1").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.keys().await.unwrap(), vec!["m2:a1".to_string()]);
    }

    #[tokio::test]
    async fn sweep_orphans_keeps_only_valid_messages() {
        let (store, _dir) = open_store().await;
        store.store("m1", "a1", vec![1], None, 1).await.unwrap();
        store.store("m2", "a1", vec![2], None, 2).await.unwrap();
        store.store("m3", "a1", vec![3], None, 3).await.unwrap();

        let valid: HashSet<String> = ["m2".to_string()].into_iter().collect();
        let deleted = store.sweep_orphans(&valid).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.keys().await.unwrap(), vec!["m2:a1".to_string()]);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blobs.db");
        {
            let store = PersistentBlobs::open(&path).await.unwrap();
            store.store("m1", "a1", vec![9], None, 5).await.unwrap();
        }
        let store = PersistentBlobs::open(&path).await.unwrap();
        let blob = store.load("m1", "a1").await.unwrap().unwrap();
        assert_eq!(blob.bytes, vec![9]);
    }
}
