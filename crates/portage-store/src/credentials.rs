// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed credential store.
//!
//! The bearer token lives in its own small file next to the databases so
//! rotation is a plain write plus read-back, independent of the state
//! document's snapshot cycle.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use portage_core::{CredentialStore, PortageError};
use tracing::debug;

/// `CredentialStore` persisting the token to a single file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional location inside the data directory.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("credential"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<String>, PortageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PortageError::Storage {
                source: Box::new(err),
            }),
        }
    }

    async fn store(&self, token: &str) -> Result<(), PortageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortageError::Storage {
                    source: Box::new(e),
                })?;
        }
        tokio::fs::write(&self.path, token)
            .await
            .map_err(|e| PortageError::Storage {
                source: Box::new(e),
            })?;
        debug!(path = %self.path.display(), "credential persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::in_data_dir(dir.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::in_data_dir(dir.path());
        store.store("tok-123").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn whitespace_only_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential");
        tokio::fs::write(&path, "  \n").await.unwrap();
        let store = FileCredentialStore::new(path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_creates_missing_parent_dirs() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/deeper/credential"));
        store.store("t").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("t"));
    }
}
