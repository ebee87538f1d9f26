// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound-mail notifier: consumes push events from a listener-style
//! backend, resolves the owning user, and pushes a chat notification.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dripmail_core::traits::ChatTransport;
use dripmail_core::types::InboundMail;
use dripmail_sessions::SessionStore;

/// Runs until the event channel closes or the token is cancelled.
///
/// An event whose recipient address no longer maps to a session is logged
/// and dropped; it must never take the worker down.
pub async fn run_notifier(
    mut events: mpsc::Receiver<InboundMail>,
    store: Arc<SessionStore>,
    transport: Arc<dyn ChatTransport>,
    cancel: CancellationToken,
) {
    info!("inbound-mail notifier started");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    info!("inbound-mail channel closed, notifier stopping");
                    break;
                }
            },
        };

        let message = event.message;
        let Some((owner, _count)) = store.record_delivery(&message.to_addr) else {
            debug!(
                to = message.to_addr.as_str(),
                "no session owns address, dropping notification"
            );
            continue;
        };

        let text = format!(
            "📨 New Email Received!\n\n\
             From: {}\n\
             To: {}\n\
             Subject: {}\n\
             Size: {} bytes\n\n\
             Content:\n{}",
            message.from_addr,
            message.to_addr,
            message.subject,
            message.size_bytes,
            message.body_text
        );
        if let Err(e) = transport.send_message(&owner, &text).await {
            warn!(user = %owner, error = %e, "failed to deliver mail notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use dripmail_core::types::{MailboxMessage, MailboxSession, SessionToken, UserId};
    use dripmail_test_utils::MockTransport;

    fn session_for(user: &str, address: &str) -> MailboxSession {
        let now = Utc::now();
        MailboxSession {
            user_id: UserId(user.into()),
            address: address.into(),
            token: SessionToken(format!("tok-{user}")),
            created_at: now,
            expires_at: now + TimeDelta::hours(1),
            emails_received: 0,
            forwarding_target: None,
        }
    }

    fn mail_to(address: &str) -> InboundMail {
        InboundMail {
            message: MailboxMessage {
                from_addr: "sender@elsewhere.example".into(),
                to_addr: address.into(),
                subject: "ping".into(),
                received_at: Utc::now(),
                size_bytes: 4,
                body_text: "body".into(),
                download_ref: None,
            },
        }
    }

    #[tokio::test]
    async fn routes_mail_to_owner_and_counts_delivery() {
        let store = Arc::new(SessionStore::new());
        store.put(session_for("u1", "a@drip.example"));
        let transport = Arc::new(MockTransport::new());
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_notifier(
            rx,
            Arc::clone(&store),
            transport.clone() as Arc<dyn ChatTransport>,
            cancel.clone(),
        ));

        tx.send(mail_to("a@drip.example")).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        let messages = transport.messages_for("u1").await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("New Email Received"));
        assert_eq!(
            store.get(&UserId("u1".into())).unwrap().emails_received,
            1
        );
    }

    #[tokio::test]
    async fn unroutable_mail_is_dropped_not_fatal() {
        let store = Arc::new(SessionStore::new());
        store.put(session_for("u1", "a@drip.example"));
        let transport = Arc::new(MockTransport::new());
        let (tx, rx) = mpsc::channel(8);

        let worker = tokio::spawn(run_notifier(
            rx,
            Arc::clone(&store),
            transport.clone() as Arc<dyn ChatTransport>,
            CancellationToken::new(),
        ));

        tx.send(mail_to("nobody@drip.example")).await.unwrap();
        tx.send(mail_to("a@drip.example")).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        // The orphan was skipped, the routable one still went through.
        assert_eq!(transport.sent_count().await, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker() {
        let store = Arc::new(SessionStore::new());
        let transport = Arc::new(MockTransport::new());
        let (_tx, rx) = mpsc::channel::<InboundMail>(8);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_notifier(
            rx,
            store,
            transport as Arc<dyn ChatTransport>,
            cancel.clone(),
        ));
        cancel.cancel();
        worker.await.unwrap();
    }
}
