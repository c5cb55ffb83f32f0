// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Portage message bridge.
//!
//! Layered loading via Figment: compiled defaults, then TOML files from the
//! XDG hierarchy, then `PORTAGE_` environment variable overrides.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::PortageConfig;

/// Well-known fallback bearer token used until the source rotates in a real
/// one via `credentialUpdate`.
pub const DEFAULT_TOKEN: &str = "fklejqwhfiu342lhk3";
