// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./dripmail.toml` > `~/.config/dripmail/dripmail.toml`
//! > `/etc/dripmail/dripmail.toml` with environment variable overrides via
//! `DRIPMAIL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::DripmailConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/dripmail/dripmail.toml` (system-wide)
/// 3. `~/.config/dripmail/dripmail.toml` (user XDG config)
/// 4. `./dripmail.toml` (local directory)
/// 5. `DRIPMAIL_*` environment variables
pub fn load_config() -> Result<DripmailConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DripmailConfig::default()))
        .merge(Toml::file("/etc/dripmail/dripmail.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("dripmail/dripmail.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("dripmail.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and for callers that supply config inline.
pub fn load_config_from_str(toml_content: &str) -> Result<DripmailConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DripmailConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DripmailConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DripmailConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` and NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `DRIPMAIL_MONITOR_FAILURE_THRESHOLD` must
/// map to `monitor.failure_threshold`, not `monitor.failure.threshold`.
fn env_provider() -> Env {
    Env::prefixed("DRIPMAIL_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: DRIPMAIL_BOT_TOKEN -> "bot_token"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("bot_", "bot.", 1)
            .replacen("mailbox_remote_", "mailbox.remote.", 1)
            .replacen("mailbox_smtp_", "mailbox.smtp.", 1)
            .replacen("mailbox_", "mailbox.", 1)
            .replacen("monitor_", "monitor.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
