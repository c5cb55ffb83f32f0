// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire-payload normalization: turns whatever the source endpoint answers
//! with into canonical [`portage_core::Message`] records.
//!
//! The source is permissive by design. Four response shapes are accepted
//! (plain text, bare array, envelope object with `messages`, single
//! message-like object), and anything unrecognized degrades to a synthetic
//! opaque message rather than an error, so operators can always see the raw
//! payload.

pub mod classify;
pub mod cursor;
pub mod id;
pub mod message;
pub mod response;

pub use classify::{is_keepalive, is_status_echo};
pub use cursor::resolve_cursor;
pub use id::derive_id;
pub use message::{normalize_message, normalize_messages};
pub use response::{ParsedResponse, parse_body};
