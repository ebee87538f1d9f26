// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock mailbox backend for deterministic testing.
//!
//! Issues predictable `mock-N@mock.example` addresses, stores delivered mail
//! in memory, and can be flipped into an unavailable state to exercise error
//! paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, Mutex};

use dripmail_core::error::DripmailError;
use dripmail_core::traits::MailboxBackend;
use dripmail_core::types::{InboundMail, MailboxMessage, ProvisionedMailbox, SessionToken};

const MOCK_DOMAIN: &str = "mock.example";
const MOCK_LIFETIME_HOURS: i64 = 1;

struct MockMailbox {
    address: String,
    expires_at: DateTime<Utc>,
    forward_to: Option<String>,
    messages: Vec<MailboxMessage>,
}

/// A scriptable in-memory mailbox backend.
pub struct MockBackend {
    mailboxes: Arc<Mutex<HashMap<SessionToken, MockMailbox>>>,
    deleted: Arc<Mutex<Vec<SessionToken>>>,
    unavailable: Arc<AtomicBool>,
    counter: AtomicU64,
    events_tx: mpsc::Sender<InboundMail>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<InboundMail>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            mailboxes: Arc::new(Mutex::new(HashMap::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
            counter: AtomicU64::new(0),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// While `true`, every operation fails with `BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delivers a message to the mailbox owning `to_addr` and emits a push
    /// event, mimicking a listener-style backend.
    pub async fn inject_mail(&self, to_addr: &str, subject: &str, body: &str) {
        let message = MailboxMessage {
            from_addr: "someone@elsewhere.example".into(),
            to_addr: to_addr.to_string(),
            subject: subject.to_string(),
            received_at: Utc::now(),
            size_bytes: body.len() as u64,
            body_text: body.to_string(),
            download_ref: None,
        };
        let mut mailboxes = self.mailboxes.lock().await;
        if let Some(mailbox) = mailboxes
            .values_mut()
            .find(|mailbox| mailbox.address == to_addr)
        {
            mailbox.messages.push(message.clone());
        }
        drop(mailboxes);
        let _ = self.events_tx.try_send(InboundMail { message });
    }

    /// Force-expires a session so subsequent calls see `SessionNotFound`.
    pub async fn expire(&self, token: &SessionToken) {
        self.mailboxes.lock().await.remove(token);
    }

    /// Tokens passed to `delete_session`, in call order.
    pub async fn deleted_tokens(&self) -> Vec<SessionToken> {
        self.deleted.lock().await.clone()
    }

    /// The recorded forwarding target for a session, if any.
    pub async fn forwarding_target(&self, token: &SessionToken) -> Option<String> {
        self.mailboxes
            .lock()
            .await
            .get(token)
            .and_then(|mailbox| mailbox.forward_to.clone())
    }

    fn check_available(&self) -> Result<(), DripmailError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DripmailError::BackendUnavailable {
                message: "mock backend set unavailable".into(),
                source: None,
            })
        } else {
            Ok(())
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxBackend for MockBackend {
    async fn create_address(&self) -> Result<ProvisionedMailbox, DripmailError> {
        self.check_available()?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let address = format!("mock-{n}@{MOCK_DOMAIN}");
        let token = SessionToken(format!("mock-token-{n}"));
        let expires_at = Utc::now() + TimeDelta::hours(MOCK_LIFETIME_HOURS);
        self.mailboxes.lock().await.insert(
            token.clone(),
            MockMailbox {
                address: address.clone(),
                expires_at,
                forward_to: None,
                messages: Vec::new(),
            },
        );
        Ok(ProvisionedMailbox {
            address,
            token,
            expires_at,
        })
    }

    async fn poll_inbox(
        &self,
        token: &SessionToken,
    ) -> Result<Vec<MailboxMessage>, DripmailError> {
        self.check_available()?;
        self.mailboxes
            .lock()
            .await
            .get(token)
            .map(|mailbox| mailbox.messages.clone())
            .ok_or(DripmailError::SessionNotFound)
    }

    async fn extend(&self, token: &SessionToken) -> Result<DateTime<Utc>, DripmailError> {
        self.check_available()?;
        let mut mailboxes = self.mailboxes.lock().await;
        let mailbox = mailboxes
            .get_mut(token)
            .ok_or(DripmailError::SessionNotFound)?;
        mailbox.expires_at =
            mailbox.expires_at.max(Utc::now()) + TimeDelta::hours(MOCK_LIFETIME_HOURS);
        Ok(mailbox.expires_at)
    }

    async fn set_forwarding(
        &self,
        token: &SessionToken,
        target: &str,
    ) -> Result<(), DripmailError> {
        self.check_available()?;
        if !target.contains('@') {
            return Err(DripmailError::InvalidAddress(target.to_string()));
        }
        let mut mailboxes = self.mailboxes.lock().await;
        let mailbox = mailboxes
            .get_mut(token)
            .ok_or(DripmailError::SessionNotFound)?;
        mailbox.forward_to = Some(target.to_string());
        Ok(())
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<(), DripmailError> {
        self.deleted.lock().await.push(token.clone());
        self.check_available()
            .map_err(|_| DripmailError::PartialFailure("mock backend unreachable".into()))?;
        self.mailboxes.lock().await.remove(token);
        Ok(())
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<InboundMail>> {
        self.events_rx.lock().ok()?.take()
    }
}
