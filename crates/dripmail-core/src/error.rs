// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the dripmail bot.

use thiserror::Error;

/// The primary error type used across all dripmail traits and core operations.
#[derive(Debug, Error)]
pub enum DripmailError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// The mailbox backend is unreachable or failed transiently. Retryable,
    /// never fatal to the process.
    #[error("mailbox backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The mailbox session expired or never existed. Surfaced to the user as
    /// "no active session" and triggers local session removal.
    #[error("mailbox session not found")]
    SessionNotFound,

    /// A user-supplied address failed syntactic validation.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// Another live process already holds the instance lock. Fatal at startup.
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    /// The chat transport reported a competing poller. Routed to the
    /// supervisor, which restarts the poller after a backoff.
    #[error("poller conflict: {0}")]
    Conflict(String),

    /// A command handler exceeded its bounded execution time and was abandoned.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Local state changed but the remote backend did not confirm. Surfaced
    /// as a warning, never hidden.
    #[error("partial failure: {0}")]
    PartialFailure(String),

    /// Chat transport errors (connection failure, delivery failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DripmailError {
    /// Renders this error as a user-facing chat message.
    ///
    /// Every dispatcher failure resolves to one of these strings; nothing
    /// propagates to the user as a raw error chain.
    pub fn user_message(&self) -> String {
        match self {
            DripmailError::BackendUnavailable { .. } => {
                "The mail service is temporarily unavailable. Please try again later.".to_string()
            }
            DripmailError::SessionNotFound => {
                "No active email session. Use /newmail to generate a new address.".to_string()
            }
            DripmailError::InvalidAddress(addr) => {
                format!("`{addr}` is not a valid email address.")
            }
            DripmailError::Timeout { .. } => {
                "That took too long and was cancelled. Please try again.".to_string()
            }
            DripmailError::PartialFailure(detail) => {
                format!("Done locally, but the mail service did not confirm: {detail}")
            }
            _ => "An error occurred. Please try again later.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_has_all_variants() {
        let _config = DripmailError::Config("test".into());
        let _backend = DripmailError::BackendUnavailable {
            message: "test".into(),
            source: None,
        };
        let _not_found = DripmailError::SessionNotFound;
        let _invalid = DripmailError::InvalidAddress("nope".into());
        let _running = DripmailError::AlreadyRunning { pid: 1 };
        let _conflict = DripmailError::Conflict("test".into());
        let _timeout = DripmailError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _partial = DripmailError::PartialFailure("test".into());
        let _transport = DripmailError::Transport {
            message: "test".into(),
            source: None,
        };
        let _internal = DripmailError::Internal("test".into());
    }

    #[test]
    fn session_not_found_user_message_suggests_newmail() {
        let msg = DripmailError::SessionNotFound.user_message();
        assert!(msg.contains("/newmail"));
    }

    #[test]
    fn invalid_address_user_message_echoes_input() {
        let msg = DripmailError::InvalidAddress("not-an-email".into()).user_message();
        assert!(msg.contains("not-an-email"));
    }

    #[test]
    fn internal_user_message_is_generic() {
        let msg = DripmailError::Internal("stack details".into()).user_message();
        assert!(!msg.contains("stack details"), "internals must not leak to chat");
    }
}
