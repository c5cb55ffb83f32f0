// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-tier blob cache for resolved attachment bytes.
//!
//! The volatile tier is a bounded in-memory map with a TTL; the persistent
//! tier is a SQLite table that mirrors successful downloads, survives
//! restarts, and rehydrates the volatile tier on fallback hits. Persistent
//! writes are best-effort: a failed write is a logged warning, never a
//! caller-visible failure.

pub mod cache;
pub mod persistent;
pub mod volatile;

pub use cache::{BlobCache, CachedBlob};
pub use persistent::PersistentBlobs;
pub use volatile::VolatileCache;
