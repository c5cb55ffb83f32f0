// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The synchronization engine.
//!
//! One cycle = fetch, normalize, dedupe, deliver, persist. A single-flight
//! guard keeps cycles from overlapping; a failed fetch degrades status and
//! commits nothing else; a successful cycle commits cursor, trimmed
//! collections, and refreshed status as one snapshot.

pub mod delivery;
pub mod engine;
pub mod ops;

pub use engine::{CycleOutcome, CycleSummary, SyncEngine};
pub use ops::AttachmentData;
