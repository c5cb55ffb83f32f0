// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for Portage: a capturing delivery target and an in-memory
//! credential store.

pub mod credentials;
pub mod mock_target;

pub use credentials::MemoryCredentialStore;
pub use mock_target::MockTarget;
