// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the dripmail workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque stable identifier of a chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-specific identifier needed to query or mutate a mailbox.
/// Opaque to everything except the owning backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

/// Health status reported by transport and backend health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

/// The binding between one chat user and one active mailbox address.
///
/// At most one session exists per user; issuing a new address overwrites the
/// old session and orphans its mailbox.
#[derive(Debug, Clone)]
pub struct MailboxSession {
    pub user_id: UserId,
    /// Currently assigned, domain-qualified mailbox address.
    pub address: String,
    pub token: SessionToken,
    pub created_at: DateTime<Utc>,
    /// Backend-supplied, or `created_at + fixed_lifetime` for the self-hosted
    /// listener. Always >= `created_at`.
    pub expires_at: DateTime<Utc>,
    /// Incremented only on confirmed inbound-mail delivery.
    pub emails_received: u64,
    /// Presence implies forwarding is active.
    pub forwarding_target: Option<String>,
}

impl MailboxSession {
    /// True once `expires_at` has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A freshly provisioned mailbox returned by `MailboxBackend::create_address`.
#[derive(Debug, Clone)]
pub struct ProvisionedMailbox {
    pub address: String,
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

/// One received email. Append-only: never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    pub from_addr: String,
    /// Must equal some session's `address` for delivery to succeed.
    pub to_addr: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub body_text: String,
    /// Opaque handle to the full raw content, when the backend offers one.
    pub download_ref: Option<String>,
}

/// Push event emitted by a listener-style backend when mail arrives.
#[derive(Debug, Clone)]
pub struct InboundMail {
    pub message: MailboxMessage,
}

/// A parsed chat command addressed to the dispatcher.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub user_id: UserId,
    /// Command name without the leading slash, e.g. `newmail`.
    pub command: String,
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn session_expiry_check() {
        let now = Utc::now();
        let session = MailboxSession {
            user_id: UserId("u1".into()),
            address: "abc@drip.example".into(),
            token: SessionToken("t1".into()),
            created_at: now,
            expires_at: now + TimeDelta::hours(24),
            emails_received: 0,
            forwarding_target: None,
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + TimeDelta::hours(25)));
    }

    #[test]
    fn user_id_display_and_round_trip() {
        let id = UserId("chat-42".into());
        assert_eq!(id.to_string(), "chat-42");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
