// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Portage message bridge.
//!
//! This crate provides the foundational error type, canonical message and
//! attachment types, and the trait seams (delivery target, credential store)
//! that the rest of the workspace is built against.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use error::PortageError;
pub use traits::{CredentialStore, DeliveryTarget};
pub use types::{
    Attachment, AttachmentFailure, AttachmentKind, BlobMeta, Cursor, DeliveryOutcome,
    DeliveryState, FetchSpec, ForwardPayload, Message, MessageKind, PayloadAttachment,
    PendingBundle, ResolveState, ResolvedAttachment, ServerConfig, StatusSnapshot, SyncSettings,
    TargetInfo, STATUS_TEXT_PREFIX,
};
