// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-hosted mailbox backend: an embedded SMTP listener that accepts mail
//! for locally issued addresses and stores it in memory.
//!
//! The dialogue is deliberately minimal (HELO/EHLO, MAIL, RCPT, DATA, RSET,
//! NOOP, QUIT). Every RCPT is checked against the configured domain
//! allow-list and against the set of active mailboxes; anything else gets a
//! permanent `550 5.1.1`, never a silent discard.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use mail_parser::MessageParser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dripmail_config::model::SmtpConfig;
use dripmail_core::error::DripmailError;
use dripmail_core::traits::MailboxBackend;
use dripmail_core::types::{InboundMail, MailboxMessage, ProvisionedMailbox, SessionToken};

use crate::address;

/// Buffered inbound-mail events before the notifier drains them.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Attempts at generating an unused local part before giving up.
const ADDRESS_ATTEMPTS: usize = 8;

struct MailboxRecord {
    token: SessionToken,
    expires_at: DateTime<Utc>,
    forward_to: Option<String>,
    messages: Vec<MailboxMessage>,
}

/// Shared message store, keyed by recipient address with a token index.
struct MailStore {
    mailboxes: DashMap<String, MailboxRecord>,
    by_token: DashMap<SessionToken, String>,
    events: mpsc::Sender<InboundMail>,
}

impl MailStore {
    /// True if `addr` belongs to an active (unexpired) mailbox.
    fn accepts(&self, addr: &str, now: DateTime<Utc>) -> bool {
        self.mailboxes
            .get(addr)
            .map(|record| record.expires_at >= now)
            .unwrap_or(false)
    }

    /// Appends a message to its mailbox and emits a push event.
    fn deliver(&self, message: MailboxMessage) {
        let Some(mut record) = self.mailboxes.get_mut(&message.to_addr) else {
            // RCPT was accepted but the mailbox vanished in between
            // (deleted session). Reject-at-RCPT covers the normal path.
            warn!(to = message.to_addr.as_str(), "mailbox gone before delivery, dropping");
            return;
        };
        if let Some(target) = &record.forward_to {
            debug!(
                to = message.to_addr.as_str(),
                forward_to = target.as_str(),
                "forwarding target recorded for delivered message"
            );
        }
        record.messages.push(message.clone());
        drop(record);

        if self.events.try_send(InboundMail { message }).is_err() {
            warn!("inbound-mail event channel full, notification dropped");
        }
    }

    /// Drops an expired mailbox from both indexes.
    fn evict(&self, addr: &str) {
        if let Some((_, record)) = self.mailboxes.remove(addr) {
            self.by_token.remove(&record.token);
        }
    }
}

/// In-process mailbox backend backed by the embedded SMTP listener.
pub struct SmtpBackend {
    store: Arc<MailStore>,
    domains: Vec<String>,
    lifetime: TimeDelta,
    events: Mutex<Option<mpsc::Receiver<InboundMail>>>,
}

impl SmtpBackend {
    /// Binds the listener socket and returns the backend plus the listener
    /// task to spawn. Binding eagerly surfaces port conflicts at startup.
    pub async fn bind(
        config: &SmtpConfig,
        session_lifetime: TimeDelta,
        shutdown: CancellationToken,
    ) -> Result<(Self, SmtpListener), DripmailError> {
        let bind = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| DripmailError::BackendUnavailable {
                message: format!("failed to bind SMTP listener on {bind}: {e}"),
                source: Some(Box::new(e)),
            })?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let store = Arc::new(MailStore {
            mailboxes: DashMap::new(),
            by_token: DashMap::new(),
            events: events_tx,
        });

        let domains: Vec<String> = config
            .allowed_domains
            .iter()
            .map(|d| d.to_ascii_lowercase())
            .collect();

        let backend = Self {
            store: Arc::clone(&store),
            domains: domains.clone(),
            lifetime: session_lifetime,
            events: Mutex::new(Some(events_rx)),
        };
        let listener = SmtpListener {
            listener,
            store,
            domains,
            shutdown,
        };
        Ok((backend, listener))
    }
}

#[async_trait]
impl MailboxBackend for SmtpBackend {
    async fn create_address(&self) -> Result<ProvisionedMailbox, DripmailError> {
        let domain = self.domains.first().ok_or_else(|| {
            DripmailError::BackendUnavailable {
                message: "no allowed domains configured for the SMTP listener".into(),
                source: None,
            }
        })?;

        let now = Utc::now();
        let expires_at = now + self.lifetime;

        for _ in 0..ADDRESS_ATTEMPTS {
            let candidate = format!("{}@{domain}", address::random_local_part());
            use dashmap::mapref::entry::Entry;
            match self.store.mailboxes.entry(candidate.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let token = SessionToken(Uuid::new_v4().to_string());
                    slot.insert(MailboxRecord {
                        token: token.clone(),
                        expires_at,
                        forward_to: None,
                        messages: Vec::new(),
                    });
                    self.store.by_token.insert(token.clone(), candidate.clone());
                    debug!(address = candidate.as_str(), "provisioned local mailbox");
                    return Ok(ProvisionedMailbox {
                        address: candidate,
                        token,
                        expires_at,
                    });
                }
            }
        }

        Err(DripmailError::BackendUnavailable {
            message: "could not find an unused local part".into(),
            source: None,
        })
    }

    async fn poll_inbox(
        &self,
        token: &SessionToken,
    ) -> Result<Vec<MailboxMessage>, DripmailError> {
        let addr = self
            .store
            .by_token
            .get(token)
            .map(|a| a.clone())
            .ok_or(DripmailError::SessionNotFound)?;

        let messages = {
            let record = self
                .store
                .mailboxes
                .get(&addr)
                .ok_or(DripmailError::SessionNotFound)?;
            if record.expires_at < Utc::now() {
                None
            } else {
                Some(record.messages.clone())
            }
        };

        match messages {
            Some(messages) => Ok(messages),
            None => {
                // Expiry is enforced lazily, on access.
                self.store.evict(&addr);
                Err(DripmailError::SessionNotFound)
            }
        }
    }

    async fn extend(&self, token: &SessionToken) -> Result<DateTime<Utc>, DripmailError> {
        let addr = self
            .store
            .by_token
            .get(token)
            .map(|a| a.clone())
            .ok_or(DripmailError::SessionNotFound)?;

        let mut record = self
            .store
            .mailboxes
            .get_mut(&addr)
            .ok_or(DripmailError::SessionNotFound)?;

        // Strictly later than both the old expiry and now, even for a
        // mailbox extended repeatedly in quick succession.
        let new_expiry = record.expires_at.max(Utc::now()) + self.lifetime;
        record.expires_at = new_expiry;
        Ok(new_expiry)
    }

    async fn set_forwarding(
        &self,
        token: &SessionToken,
        target: &str,
    ) -> Result<(), DripmailError> {
        address::validate(target)?;

        let addr = self
            .store
            .by_token
            .get(token)
            .map(|a| a.clone())
            .ok_or(DripmailError::SessionNotFound)?;

        let mut record = self
            .store
            .mailboxes
            .get_mut(&addr)
            .ok_or(DripmailError::SessionNotFound)?;
        record.forward_to = Some(target.to_string());
        Ok(())
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<(), DripmailError> {
        if let Some((_, addr)) = self.store.by_token.remove(token) {
            self.store.mailboxes.remove(&addr);
        }
        // Deleting an already-gone mailbox is fine.
        Ok(())
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<InboundMail>> {
        self.events.lock().ok()?.take()
    }
}

/// Accept loop for the embedded SMTP listener. Runs until cancelled.
pub struct SmtpListener {
    listener: TcpListener,
    store: Arc<MailStore>,
    domains: Vec<String>,
    shutdown: CancellationToken,
}

impl SmtpListener {
    /// The bound socket address, useful when the port was configured as 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        info!(addr = ?self.listener.local_addr().ok(), "SMTP listener accepting connections");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("SMTP listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let store = Arc::clone(&self.store);
                            let domains = self.domains.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer, store, domains).await {
                                    debug!(peer = %peer, error = %e, "SMTP connection ended with error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }
    }
}

/// Envelope state accumulated across one MAIL transaction.
#[derive(Default)]
struct Envelope {
    mail_from: Option<String>,
    rcpt_to: Vec<String>,
}

async fn reply(write: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    // One write per reply so each fits a single TCP segment.
    write.write_all(format!("{line}\r\n").as_bytes()).await
}

/// Extracts the address from `MAIL FROM:<a@b>` / `RCPT TO:<a@b>` syntax.
fn envelope_addr(rest: &str) -> Option<String> {
    let (_, after) = rest.split_once(':')?;
    let trimmed = after.trim();
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_ascii_lowercase())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<MailStore>,
    domains: Vec<String>,
) -> std::io::Result<()> {
    debug!(peer = %peer, "SMTP connection accepted");
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read);
    let mut buf = String::new();
    let mut envelope = Envelope::default();

    reply(&mut write, "220 dripmail ESMTP ready").await?;

    loop {
        buf.clear();
        if lines.read_line(&mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_end_matches(['\r', '\n']);
        let upper = line.to_ascii_uppercase();

        if upper.starts_with("HELO") || upper.starts_with("EHLO") {
            reply(&mut write, "250 dripmail greets you").await?;
        } else if upper.starts_with("MAIL FROM") {
            match envelope_addr(line) {
                Some(addr) => {
                    envelope = Envelope {
                        mail_from: Some(addr),
                        rcpt_to: Vec::new(),
                    };
                    reply(&mut write, "250 2.1.0 Ok").await?;
                }
                None => reply(&mut write, "501 5.1.7 bad sender address syntax").await?,
            }
        } else if upper.starts_with("RCPT TO") {
            let Some(addr) = envelope_addr(line) else {
                reply(&mut write, "501 5.1.3 bad recipient address syntax").await?;
                continue;
            };
            let domain_ok = address::domain_of(&addr)
                .map(|d| domains.contains(&d))
                .unwrap_or(false);
            if domain_ok && store.accepts(&addr, Utc::now()) {
                envelope.rcpt_to.push(addr);
                reply(&mut write, "250 2.1.5 Ok").await?;
            } else {
                reply(&mut write, "550 5.1.1 mailbox unavailable").await?;
            }
        } else if upper == "DATA" {
            if envelope.rcpt_to.is_empty() {
                reply(&mut write, "503 5.5.1 no valid recipients").await?;
                continue;
            }
            reply(&mut write, "354 End data with <CR><LF>.<CR><LF>").await?;
            let raw = read_data(&mut lines, &mut buf).await?;
            let messages = build_messages(&envelope, &raw);
            for message in messages {
                store.deliver(message);
            }
            envelope = Envelope::default();
            reply(&mut write, "250 2.0.0 Ok, message accepted").await?;
        } else if upper == "RSET" {
            envelope = Envelope::default();
            reply(&mut write, "250 2.0.0 Ok").await?;
        } else if upper == "NOOP" {
            reply(&mut write, "250 2.0.0 Ok").await?;
        } else if upper == "QUIT" {
            reply(&mut write, "221 2.0.0 Bye").await?;
            break;
        } else {
            reply(&mut write, "502 5.5.2 command not implemented").await?;
        }
    }

    Ok(())
}

/// Reads the DATA body up to the lone-dot terminator, undoing dot stuffing.
async fn read_data<R: AsyncBufReadExt + Unpin>(
    lines: &mut R,
    buf: &mut String,
) -> std::io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    loop {
        buf.clear();
        if lines.read_line(buf).await? == 0 {
            break;
        }
        let line = buf.trim_end_matches(['\r', '\n']);
        if line == "." {
            break;
        }
        let line = line.strip_prefix('.').unwrap_or(line);
        raw.extend_from_slice(line.as_bytes());
        raw.extend_from_slice(b"\r\n");
    }
    Ok(raw)
}

/// Parses the raw message and fans it out to every accepted recipient.
fn build_messages(envelope: &Envelope, raw: &[u8]) -> Vec<MailboxMessage> {
    let parsed = MessageParser::default().parse(raw);
    let (subject, body_text) = match &parsed {
        Some(message) => (
            message.subject().unwrap_or("(no subject)").to_string(),
            message
                .body_text(0)
                .map(|t| t.into_owned())
                .unwrap_or_default(),
        ),
        None => (
            "(no subject)".to_string(),
            String::from_utf8_lossy(raw).into_owned(),
        ),
    };

    let from_addr = envelope
        .mail_from
        .clone()
        .unwrap_or_else(|| "<>".to_string());
    let received_at = Utc::now();

    envelope
        .rcpt_to
        .iter()
        .map(|rcpt| MailboxMessage {
            from_addr: from_addr.clone(),
            to_addr: rcpt.clone(),
            subject: subject.clone(),
            received_at,
            size_bytes: raw.len() as u64,
            body_text: body_text.clone(),
            download_ref: None,
        })
        .collect()
}
