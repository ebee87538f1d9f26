// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command dispatcher: maps parsed chat commands to mailbox operations.
//!
//! Every failure resolves to a user-facing string; nothing propagates out of
//! `dispatch`, and no single command can wedge the poll loop thanks to the
//! per-command timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use dripmail_core::error::DripmailError;
use dripmail_core::traits::MailboxBackend;
use dripmail_core::types::{CommandRequest, MailboxSession, UserId};
use dripmail_sessions::SessionStore;

const WELCOME_MESSAGE: &str = "👋 Welcome to Dripmail Bot!\n\n\
This bot helps you create temporary email addresses.\n\n\
Commands:\n\
/newmail - Generate a new temporary email address\n\
/current - Show current email address\n\
/inbox - Check for received emails\n\
/extend - Extend the current session's lifetime\n\
/delete - Delete current email session\n\
/stats - Show email statistics\n\
/forward - Set email forwarding\n\
/help - Show this help message";

const HELP_MESSAGE: &str = "📧 Dripmail Bot Help\n\n\
Commands:\n\
/newmail - Generate a new temporary email address\n\
/current - Show current email address\n\
/inbox - Check for received emails\n\
/extend - Extend the current session's lifetime\n\
/delete - Delete current email session\n\
/stats - Show email statistics\n\
/forward - Set email forwarding\n\
/help - Show this help message\n\n\
How to use:\n\
1. Use /newmail to get a temporary email address\n\
2. Share this email address with anyone\n\
3. Emails sent to this address will be shown in the chat\n\
4. The address is temporary and expires after some time\n\
5. Use /extend to push the expiry further out\n\
6. Use /forward to relay incoming mail to a real address";

fn fmt_ts(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Routes chat commands to the session store and mailbox backend.
pub struct Dispatcher {
    store: Arc<SessionStore>,
    backend: Arc<dyn MailboxBackend>,
    command_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn MailboxBackend>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            command_timeout,
        }
    }

    /// Handles one command, always producing a user-facing reply.
    pub async fn dispatch(&self, request: &CommandRequest) -> String {
        match tokio::time::timeout(self.command_timeout, self.execute(request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                debug!(
                    user = %request.user_id,
                    command = request.command.as_str(),
                    error = %e,
                    "command failed"
                );
                e.user_message()
            }
            Err(_) => {
                warn!(
                    user = %request.user_id,
                    command = request.command.as_str(),
                    timeout = ?self.command_timeout,
                    "command timed out and was abandoned"
                );
                DripmailError::Timeout {
                    duration: self.command_timeout,
                }
                .user_message()
            }
        }
    }

    async fn execute(&self, request: &CommandRequest) -> Result<String, DripmailError> {
        let user = &request.user_id;
        match request.command.as_str() {
            "start" => Ok(WELCOME_MESSAGE.to_string()),
            "help" => Ok(HELP_MESSAGE.to_string()),
            "newmail" => self.newmail(user).await,
            "current" => self.current(user),
            "inbox" => self.inbox(user).await,
            "stats" => self.stats(user).await,
            "extend" => self.extend(user).await,
            "forward" => self.forward(user, request.args.first().map(String::as_str)).await,
            "delete" => self.delete(user).await,
            other => {
                debug!(user = %user, command = other, "unknown command");
                Ok("❓ Unknown command. Use /help to see available commands.".to_string())
            }
        }
    }

    /// Looks up the user's session, enforcing expiry lazily.
    fn active_session(&self, user: &UserId) -> Result<MailboxSession, DripmailError> {
        let session = self.store.get(user).ok_or(DripmailError::SessionNotFound)?;
        if session.is_expired(Utc::now()) {
            self.store.remove(user);
            return Err(DripmailError::SessionNotFound);
        }
        Ok(session)
    }

    async fn newmail(&self, user: &UserId) -> Result<String, DripmailError> {
        let mailbox = self.backend.create_address().await?;
        let session = MailboxSession {
            user_id: user.clone(),
            address: mailbox.address.clone(),
            token: mailbox.token,
            created_at: Utc::now(),
            expires_at: mailbox.expires_at,
            emails_received: 0,
            forwarding_target: None,
        };
        // A pre-existing session is overwritten; its mailbox is orphaned,
        // not deleted, matching the one-session-per-user rule.
        self.store.put(session);

        Ok(format!(
            "📧 Your temporary email address:\n\n\
             `{}`\n\n\
             Use this address to receive emails.\n\
             Expires at: {}\n\n\
             Use /inbox to check for new emails.",
            mailbox.address,
            fmt_ts(mailbox.expires_at)
        ))
    }

    fn current(&self, user: &UserId) -> Result<String, DripmailError> {
        let session = self.active_session(user)?;
        let forwarding = match &session.forwarding_target {
            Some(target) => format!("\nForwarding to: {target}"),
            None => String::new(),
        };
        Ok(format!(
            "📧 Current Email Address:\n\n\
             `{}`\n\n\
             Expires at: {}{forwarding}",
            session.address,
            fmt_ts(session.expires_at)
        ))
    }

    async fn inbox(&self, user: &UserId) -> Result<String, DripmailError> {
        let session = self.active_session(user)?;
        let mails = match self.backend.poll_inbox(&session.token).await {
            Ok(mails) => mails,
            Err(DripmailError::SessionNotFound) => {
                // Expired server-side; drop the stale local binding too.
                self.store.remove(user);
                return Err(DripmailError::SessionNotFound);
            }
            Err(e) => return Err(e),
        };

        if mails.is_empty() {
            return Ok("📭 No new emails received yet.".to_string());
        }

        let blocks: Vec<String> = mails
            .iter()
            .map(|mail| {
                format!(
                    "📨 {}\n\
                     From: {}\n\
                     To: {}\n\
                     Size: {} bytes\n\n\
                     {}",
                    mail.subject, mail.from_addr, mail.to_addr, mail.size_bytes, mail.body_text
                )
            })
            .collect();
        Ok(blocks.join("\n\n———\n\n"))
    }

    async fn stats(&self, user: &UserId) -> Result<String, DripmailError> {
        let session = self.active_session(user)?;
        let mails = match self.backend.poll_inbox(&session.token).await {
            Ok(mails) => mails,
            Err(DripmailError::SessionNotFound) => {
                self.store.remove(user);
                return Err(DripmailError::SessionNotFound);
            }
            Err(e) => return Err(e),
        };

        let total_size: u64 = mails.iter().map(|m| m.size_bytes).sum();
        let unique_senders = {
            let mut senders: Vec<&str> = mails.iter().map(|m| m.from_addr.as_str()).collect();
            senders.sort_unstable();
            senders.dedup();
            senders.len()
        };

        Ok(format!(
            "📊 Email Statistics:\n\n\
             Total Emails: {}\n\
             Total Size: {:.2} KB\n\
             Unique Senders: {}\n\
             Session Expires: {}",
            mails.len(),
            total_size as f64 / 1024.0,
            unique_senders,
            fmt_ts(session.expires_at)
        ))
    }

    async fn extend(&self, user: &UserId) -> Result<String, DripmailError> {
        let session = self.active_session(user)?;
        let new_expiry = self.backend.extend(&session.token).await?;
        self.store.update(user, |s| s.expires_at = new_expiry);
        Ok(format!(
            "✅ Session extended.\nNew expiry: {}",
            fmt_ts(new_expiry)
        ))
    }

    async fn forward(
        &self,
        user: &UserId,
        target: Option<&str>,
    ) -> Result<String, DripmailError> {
        let Some(target) = target else {
            return Ok("❌ Please provide an email address to forward to.\n\
                       Usage: /forward your@email.com"
                .to_string());
        };
        let session = self.active_session(user)?;
        // On any failure the stored target stays unchanged.
        self.backend.set_forwarding(&session.token, target).await?;
        self.store
            .update(user, |s| s.forwarding_target = Some(target.to_string()));
        Ok(format!("✅ Emails will now be forwarded to {target}"))
    }

    async fn delete(&self, user: &UserId) -> Result<String, DripmailError> {
        let Some(session) = self.store.get(user) else {
            return Ok("❌ No active email session to delete.".to_string());
        };

        match self.backend.delete_session(&session.token).await {
            Ok(()) => {
                self.store.remove(user);
                Ok("✅ Email session deleted successfully.".to_string())
            }
            Err(e @ DripmailError::PartialFailure(_)) => {
                // Local state goes away regardless; the user gets a warning
                // that the remote side did not confirm.
                self.store.remove(user);
                Ok(e.user_message())
            }
            Err(e) => Err(e),
        }
    }
}
