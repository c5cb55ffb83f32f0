// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory credential store for deterministic tests.

use async_trait::async_trait;
use tokio::sync::Mutex;

use portage_core::{CredentialStore, PortageError};

/// A `CredentialStore` backed by a mutex-guarded option.
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new(initial: Option<&str>) -> Self {
        Self {
            token: Mutex::new(initial.map(str::to_string)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<String>, PortageError> {
        Ok(self.token.lock().await.clone())
    }

    async fn store(&self, token: &str) -> Result<(), PortageError> {
        *self.token.lock().await = Some(token.to_string());
        Ok(())
    }
}
