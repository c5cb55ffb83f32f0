// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams for external collaborators and pluggable backends.

pub mod credentials;
pub mod target;

pub use credentials::CredentialStore;
pub use target::DeliveryTarget;
