// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tandem.toml` > `~/.config/tandem/tandem.toml` > `/etc/tandem/tandem.toml`
//! with environment variable overrides via `TANDEM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TandemConfig;

/// Config file name looked up in every layer.
pub const CONFIG_FILE_NAME: &str = "tandem.toml";

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tandem/tandem.toml";

/// Top-level sections, used to map `TANDEM_SECTION_KEY` to `section.key`.
const SECTIONS: &[&str] = &[
    "agent",
    "analyzer",
    "policy",
    "local",
    "api",
    "integrator",
    "orchestrator",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tandem/tandem.toml` (system-wide)
/// 3. `~/.config/tandem/tandem.toml` (user XDG config)
/// 4. `./tandem.toml` (local directory)
/// 5. `TANDEM_*` environment variables
pub fn load_config() -> Result<TandemConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<TandemConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TandemConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TandemConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TandemConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TandemConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(CONFIG_FILE_NAME))
        .merge(env_provider())
}

/// `~/.config/tandem/tandem.toml`, when a config directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tandem").join(CONFIG_FILE_NAME))
}

/// Map a lowercased, prefix-stripped env var name to a dotted config key.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `api_max_retries` maps to `api.max_retries`, not `api.max.retries`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section) {
            if let Some(field) = rest.strip_prefix('_') {
                return format!("{section}.{field}");
            }
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("TANDEM_").map(|key| map_env_key(key.as_str()).into())
}
