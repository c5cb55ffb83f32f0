// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential-store seam used by the network client.

use async_trait::async_trait;

use crate::error::PortageError;

/// Persisted home of the bearer token used against the source endpoint.
///
/// `load` returning `Ok(None)` means no token has ever been stored; callers
/// fall back to the well-known default token.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, PortageError>;

    async fn store(&self, token: &str) -> Result<(), PortageError>;
}
