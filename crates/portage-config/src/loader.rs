// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./portage.toml` > `~/.config/portage/portage.toml`
//! > `/etc/portage/portage.toml` with environment variable overrides via the
//! `PORTAGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PortageConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/portage/portage.toml` (system-wide)
/// 3. `~/.config/portage/portage.toml` (user XDG config)
/// 4. `./portage.toml` (local directory)
/// 5. `PORTAGE_*` environment variables
pub fn load_config() -> Result<PortageConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PortageConfig::default()))
        .merge(Toml::file("/etc/portage/portage.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("portage/portage.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("portage.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit inline configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<PortageConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PortageConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PortageConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PortageConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `PORTAGE_SOURCE_TIMEOUT_MS` must map to
/// `source.timeout_ms`, not `source.timeout.ms`.
fn env_provider() -> Env {
    Env::prefixed("PORTAGE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("source_", "source.", 1)
            .replacen("sync_", "sync.", 1)
            .replacen("attachments_", "attachments.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("target_", "target.", 1);
        mapped.into()
    })
}
