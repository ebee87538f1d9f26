// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the dripmail bot.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level dripmail configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DripmailConfig {
    /// Process identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Chat bot credential and dispatch settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Mailbox backend selection and settings.
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Health monitor and restart policy settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Health endpoint settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Override for the instance lock file path. Defaults to
    /// `<tempdir>/dripmail.lock` when unset.
    #[serde(default)]
    pub lock_path: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lock_path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Chat bot configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Chat platform credential token. `None` disables the transport.
    #[serde(default)]
    pub token: Option<String>,

    /// Bounded per-command execution time. A handler exceeding this is
    /// abandoned so it cannot stall subsequent updates.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

fn default_command_timeout_secs() -> u64 {
    15
}

/// Which mailbox backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote mail-drop GraphQL service.
    Remote,
    /// Self-hosted SMTP listener.
    Smtp,
}

/// Mailbox backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MailboxConfig {
    /// Backend selection: remote API or self-hosted listener.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Fixed mailbox lifetime for the self-hosted backend; the remote
    /// backend supplies its own expiry.
    #[serde(default = "default_session_lifetime_hours")]
    pub session_lifetime_hours: u64,

    /// Remote mail-drop API settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Self-hosted SMTP listener settings.
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            session_lifetime_hours: default_session_lifetime_hours(),
            remote: RemoteConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

fn default_backend() -> BackendKind {
    BackendKind::Remote
}

fn default_session_lifetime_hours() -> u64 {
    24
}

/// Remote mail-drop API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// GraphQL endpoint of the mail-drop service.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

fn default_api_url() -> String {
    "https://dropmail.me/api/graphql/web-test".to_string()
}

/// Self-hosted SMTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    /// Address to bind the mail listener to.
    #[serde(default = "default_smtp_bind")]
    pub bind_address: String,

    /// Mail submission port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Recipient domains the listener accepts mail for. Mail to any other
    /// domain is rejected with a permanent failure.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_smtp_bind(),
            port: default_smtp_port(),
            allowed_domains: Vec::new(),
        }
    }
}

fn default_smtp_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_smtp_port() -> u16 {
    2525
}

/// Health monitor and restart policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Interval between liveness probes.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Consecutive probe failures before a restart is triggered.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Restart attempts within the monitoring window before the supervisor
    /// gives up and the process exits non-zero.
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,

    /// Length of the restart-counting window.
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,

    /// Fixed sleep before reacquiring the poller after a conflict, so two
    /// instances do not fight in a tight loop.
    #[serde(default = "default_conflict_backoff_secs")]
    pub conflict_backoff_secs: u64,

    /// Grace period for in-flight command handlers during a restart or
    /// shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            failure_threshold: default_failure_threshold(),
            max_restart_attempts: default_max_restart_attempts(),
            restart_window_secs: default_restart_window_secs(),
            conflict_backoff_secs: default_conflict_backoff_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_restart_window_secs() -> u64 {
    600
}

fn default_conflict_backoff_secs() -> u64 {
    5
}

fn default_drain_timeout_secs() -> u64 {
    10
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Whether to serve the health endpoint at all.
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}
