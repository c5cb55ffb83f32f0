// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted state for the Portage message bridge.
//!
//! The whole engine state lives in one canonical record: cursor, bounded
//! message history, pending bundles, dedupe ledger, status, target binding,
//! and settings. Every save writes the full record as a single snapshot, so
//! a cycle either commits a consistent new state or leaves the previous one
//! untouched.

pub mod credentials;
pub mod record;
pub mod store;

pub use credentials::FileCredentialStore;
pub use record::{StateRecord, MAX_PENDING_BUNDLES, MAX_RECENT_IDS};
pub use store::StateStore;
