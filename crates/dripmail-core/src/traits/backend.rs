// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mailbox backend trait: uniform interface over address issuance and
//! message storage, whether remote (mail-drop API) or self-hosted
//! (embedded SMTP listener).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::DripmailError;
use crate::types::{InboundMail, MailboxMessage, ProvisionedMailbox, SessionToken};

/// Adapter over a disposable-mailbox provider.
///
/// All operations are idempotent where repetition is possible; callers may
/// retry `BackendUnavailable` failures freely.
#[async_trait]
pub trait MailboxBackend: Send + Sync {
    /// Provisions a fresh mailbox address.
    ///
    /// Fails with `BackendUnavailable` on network or listener failure; the
    /// caller must not create a session on failure.
    async fn create_address(&self) -> Result<ProvisionedMailbox, DripmailError>;

    /// Returns the full current message set for a mailbox, order-stable.
    ///
    /// Backends are not required to support delta fetch; calling twice with
    /// no intervening mail returns identical lists. Fails with
    /// `SessionNotFound` once the session has expired server-side.
    async fn poll_inbox(&self, token: &SessionToken) -> Result<Vec<MailboxMessage>, DripmailError>;

    /// Pushes the mailbox expiry forward, returning the new expiry.
    ///
    /// The returned timestamp is strictly later than the previous one.
    /// Fails with `SessionNotFound` if the session already expired.
    async fn extend(&self, token: &SessionToken) -> Result<DateTime<Utc>, DripmailError>;

    /// Enables forwarding of incoming mail to `target`.
    ///
    /// Validates `target` syntactically before touching the backend; fails
    /// with `InvalidAddress` without any backend call on malformed input.
    async fn set_forwarding(&self, token: &SessionToken, target: &str)
        -> Result<(), DripmailError>;

    /// Deletes the mailbox, best-effort.
    ///
    /// If the backend is unreachable this fails with `PartialFailure`; the
    /// caller still removes the local session and warns the user instead of
    /// blocking on remote confirmation.
    async fn delete_session(&self, token: &SessionToken) -> Result<(), DripmailError>;

    /// Subscribes to push-delivered inbound mail.
    ///
    /// `Some` only for listener-style backends; request/response backends
    /// return `None` and rely on explicit `poll_inbox` calls.
    fn subscribe(&self) -> Option<mpsc::Receiver<InboundMail>>;
}
