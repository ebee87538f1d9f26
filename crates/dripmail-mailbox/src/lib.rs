// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mailbox backends: the remote mail-drop GraphQL client and the
//! self-hosted SMTP listener, behind one [`MailboxBackend`] trait.

use std::sync::Arc;

use chrono::TimeDelta;
use tokio_util::sync::CancellationToken;

use dripmail_config::model::{BackendKind, MailboxConfig};
use dripmail_core::error::DripmailError;
use dripmail_core::traits::MailboxBackend;

pub mod address;
pub mod remote;
pub mod smtp;

pub use remote::RemoteDropClient;
pub use smtp::{SmtpBackend, SmtpListener};

/// Builds the configured backend.
///
/// For the SMTP variant this also binds the listener socket and returns the
/// accept-loop task for the caller to spawn; the remote variant has no
/// long-running task of its own.
pub async fn build_backend(
    config: &MailboxConfig,
    shutdown: CancellationToken,
) -> Result<(Arc<dyn MailboxBackend>, Option<SmtpListener>), DripmailError> {
    match config.backend {
        BackendKind::Remote => {
            let client = RemoteDropClient::new(&config.remote)?;
            Ok((Arc::new(client), None))
        }
        BackendKind::Smtp => {
            let lifetime = TimeDelta::hours(config.session_lifetime_hours as i64);
            let (backend, listener) = SmtpBackend::bind(&config.smtp, lifetime, shutdown).await?;
            Ok((Arc::new(backend), Some(listener)))
        }
    }
}
