// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./parley.toml` > `~/.config/parley/parley.toml` >
//! `/etc/parley/parley.toml`, with environment variable overrides via `PARLEY_`.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ParleyConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/parley/parley.toml`
/// 3. `~/.config/parley/parley.toml`
/// 4. `./parley.toml`
/// 5. `PARLEY_*` environment variables
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file("/etc/parley/parley.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("parley/parley.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("parley.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so that
/// `PARLEY_MESSAGING_SEND_COOLDOWN_MS` maps to `messaging.send_cooldown_ms`.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("session_", "session.", 1)
            .replacen("backend_", "backend.", 1)
            .replacen("messaging_", "messaging.", 1)
            .replacen("media_", "media.", 1);
        mapped.into()
    })
}
