// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses and coherent monitor thresholds.

use crate::diagnostic::ConfigError;
use crate::model::{BackendKind, DripmailConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &DripmailConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    validate_bind_address(&config.gateway.host, "gateway.host", &mut errors);
    validate_bind_address(
        &config.mailbox.smtp.bind_address,
        "mailbox.smtp.bind_address",
        &mut errors,
    );

    if config.monitor.probe_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "monitor.probe_interval_secs must be positive".to_string(),
        });
    }

    if config.monitor.failure_threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "monitor.failure_threshold must be at least 1".to_string(),
        });
    }

    if config.monitor.restart_window_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "monitor.restart_window_secs must be positive".to_string(),
        });
    }

    if config.bot.command_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "bot.command_timeout_secs must be positive".to_string(),
        });
    }

    if config.mailbox.session_lifetime_hours == 0 {
        errors.push(ConfigError::Validation {
            message: "mailbox.session_lifetime_hours must be positive".to_string(),
        });
    }

    // The smtp backend is useless without at least one deliverable domain.
    if config.mailbox.backend == BackendKind::Smtp
        && config.mailbox.smtp.allowed_domains.is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "mailbox.smtp.allowed_domains must not be empty when backend = \"smtp\""
                .to_string(),
        });
    }

    if config.mailbox.backend == BackendKind::Remote
        && config.mailbox.remote.api_url.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "mailbox.remote.api_url must not be empty when backend = \"remote\""
                .to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Accept valid IPv4, IPv6, or hostname patterns.
fn validate_bind_address(addr: &str, key: &str, errors: &mut Vec<ConfigError>) {
    let addr = addr.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: format!("{key} must not be empty"),
        });
        return;
    }

    let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
    let is_valid_hostname = addr
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
    if !is_valid_ip && !is_valid_hostname {
        errors.push(ConfigError::Validation {
            message: format!("{key} `{addr}` is not a valid IP address or hostname"),
        });
    }
}
