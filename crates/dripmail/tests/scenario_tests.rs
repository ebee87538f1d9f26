// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios across the wired pipeline: poll loop, dispatcher,
//! session store, backend, notifier, and instance lock.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dripmail_agent::poller::{ActivityTracker, BotLoop};
use dripmail_agent::{run_notifier, Dispatcher};
use dripmail_core::error::DripmailError;
use dripmail_core::traits::{ChatTransport, MailboxBackend};
use dripmail_core::types::UserId;
use dripmail_sessions::SessionStore;
use dripmail_supervisor::InstanceLock;
use dripmail_test_utils::{MockBackend, MockTransport};

struct Pipeline {
    transport: Arc<MockTransport>,
    backend: Arc<MockBackend>,
    store: Arc<SessionStore>,
    cancel: CancellationToken,
}

/// Wires a full bot pipeline over mocks and spawns its poll loop and
/// notifier.
fn start_pipeline() -> Pipeline {
    let transport = Arc::new(MockTransport::new());
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(SessionStore::new());
    let cancel = CancellationToken::new();

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        Arc::clone(&backend) as Arc<dyn MailboxBackend>,
        Duration::from_secs(5),
    ));
    let activity = Arc::new(ActivityTracker::new());
    let bot = BotLoop::new(
        Arc::clone(&transport) as Arc<dyn ChatTransport>,
        dispatcher,
        activity,
        cancel.clone(),
    );
    tokio::spawn(bot.run());

    if let Some(events) = backend.subscribe() {
        tokio::spawn(run_notifier(
            events,
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
            cancel.clone(),
        ));
    }

    Pipeline {
        transport,
        backend,
        store,
        cancel,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn new_address_is_coherent_across_commands() {
    let p = start_pipeline();

    p.transport.inject_command("alice", "newmail", &[]).await;
    settle().await;

    let session = p.store.get(&UserId("alice".into())).expect("session exists");
    assert!(session.address.ends_with("@mock.example"));
    assert!(session.expires_at > chrono::Utc::now());
    assert_eq!(
        p.store.find_by_address(&session.address),
        Some(UserId("alice".into()))
    );

    p.transport.inject_command("alice", "current", &[]).await;
    settle().await;

    let messages = p.transport.messages_for("alice").await;
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains(&session.address));
    assert!(messages[1].contains(&session.address));

    p.cancel.cancel();
}

#[tokio::test]
async fn unroutable_inbound_mail_is_dropped_quietly() {
    let p = start_pipeline();

    p.transport.inject_command("alice", "newmail", &[]).await;
    settle().await;
    p.transport.clear_sent().await;

    p.backend
        .inject_mail("stranger@mock.example", "spam", "who dis")
        .await;
    settle().await;

    // No notification, no crash, and the pipeline still works afterwards.
    assert_eq!(p.transport.sent_count().await, 0);
    let address = p.store.get(&UserId("alice".into())).unwrap().address;
    p.backend.inject_mail(&address, "real", "hello").await;
    settle().await;

    let messages = p.transport.messages_for("alice").await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("real"));
    assert_eq!(
        p.store.get(&UserId("alice".into())).unwrap().emails_received,
        1
    );

    p.cancel.cancel();
}

#[tokio::test]
async fn malformed_forward_target_changes_nothing() {
    let p = start_pipeline();

    p.transport.inject_command("alice", "newmail", &[]).await;
    settle().await;
    p.transport
        .inject_command("alice", "forward", &["definitely not an address"])
        .await;
    settle().await;

    let messages = p.transport.messages_for("alice").await;
    assert!(messages.last().unwrap().contains("not a valid email address"));
    let session = p.store.get(&UserId("alice".into())).unwrap();
    assert_eq!(session.forwarding_target, None);
    let token = session.token;
    assert_eq!(p.backend.forwarding_target(&token).await, None);

    p.cancel.cancel();
}

#[tokio::test]
async fn concurrent_users_do_not_interfere() {
    let p = start_pipeline();

    for user in ["alice", "bob", "carol"] {
        p.transport.inject_command(user, "newmail", &[]).await;
    }
    settle().await;

    assert_eq!(p.store.len(), 3);
    let alice = p.store.get(&UserId("alice".into())).unwrap();
    let bob = p.store.get(&UserId("bob".into())).unwrap();
    assert_ne!(alice.address, bob.address);

    p.transport.inject_command("bob", "delete", &[]).await;
    settle().await;

    assert_eq!(p.store.len(), 2);
    assert!(p.store.get(&UserId("alice".into())).is_some());

    p.cancel.cancel();
}

#[test]
fn one_lock_winner_per_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dripmail.lock");

    let results: Vec<Result<InstanceLock, DripmailError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| InstanceLock::acquire(&path)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one process may hold the lock");
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, DripmailError::AlreadyRunning { .. }));
        }
    }
}
