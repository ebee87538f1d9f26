// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat transport for deterministic testing.
//!
//! `MockTransport` implements `ChatTransport` with injectable commands and
//! captured outbound messages for assertion in tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use dripmail_core::error::DripmailError;
use dripmail_core::traits::ChatTransport;
use dripmail_core::types::{CommandRequest, HealthStatus, UserId};

/// One queued result for `next_command`: a command, or a transport failure.
type CommandOutcome = Result<CommandRequest, DripmailError>;

/// What `health_check()` should report. `DripmailError` holds boxed sources
/// and is not `Clone`, so the mock stores this reduced form instead.
#[derive(Debug, Clone)]
pub enum MockHealth {
    Status(HealthStatus),
    TransportError(String),
    Conflict(String),
}

impl MockHealth {
    fn to_result(&self) -> Result<HealthStatus, DripmailError> {
        match self {
            MockHealth::Status(status) => Ok(status.clone()),
            MockHealth::TransportError(msg) => Err(DripmailError::Transport {
                message: msg.clone(),
                source: None,
            }),
            MockHealth::Conflict(msg) => Err(DripmailError::Conflict(msg.clone())),
        }
    }
}

/// A mock chat transport for testing.
///
/// Provides two queues:
/// - **inbound**: outcomes injected via `inject_command()` / `inject_failure()`
///   are returned by `next_command()`
/// - **sent**: messages passed to `send_message()` are captured and
///   retrievable via `sent_messages()`
pub struct MockTransport {
    inbound: Arc<Mutex<VecDeque<CommandOutcome>>>,
    sent: Arc<Mutex<Vec<(UserId, String)>>>,
    health: Arc<Mutex<MockHealth>>,
    notify: Arc<Notify>,
}

impl MockTransport {
    /// Create a new mock transport with empty queues and a healthy probe.
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            health: Arc::new(Mutex::new(MockHealth::Status(HealthStatus::Healthy))),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Inject a command into the receive queue.
    pub async fn inject_command(&self, user: &str, command: &str, args: &[&str]) {
        let request = CommandRequest {
            user_id: UserId(user.to_string()),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        self.inbound.lock().await.push_back(Ok(request));
        self.notify.notify_one();
    }

    /// Inject a transport failure; the next `next_command()` returns it.
    pub async fn inject_failure(&self, error: DripmailError) {
        self.inbound.lock().await.push_back(Err(error));
        self.notify.notify_one();
    }

    /// Replace what future `health_check()` calls will report.
    pub async fn set_health(&self, health: MockHealth) {
        *self.health.lock().await = health;
    }

    /// Get all `(user, text)` pairs that were sent through `send_message()`.
    pub async fn sent_messages(&self) -> Vec<(UserId, String)> {
        self.sent.lock().await.clone()
    }

    /// Get the count of sent messages.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// All texts sent to one user, in send order.
    pub async fn messages_for(&self, user: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(id, _)| id.0 == user)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Clear all sent messages.
    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn next_command(&self) -> Result<CommandRequest, DripmailError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(outcome) = queue.pop_front() {
                    return outcome;
                }
            }
            // Wait for notification that a new outcome was injected
            self.notify.notified().await;
        }
    }

    async fn send_message(&self, user: &UserId, text: &str) -> Result<(), DripmailError> {
        self.sent
            .lock()
            .await
            .push((user.clone(), text.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, DripmailError> {
        self.health.lock().await.to_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn next_command_returns_injected_in_order() {
        let transport = MockTransport::new();
        transport.inject_command("u1", "newmail", &[]).await;
        transport.inject_command("u1", "stats", &[]).await;

        let first = transport.next_command().await.unwrap();
        let second = transport.next_command().await.unwrap();
        assert_eq!(first.command, "newmail");
        assert_eq!(second.command, "stats");
    }

    #[tokio::test]
    async fn send_captures_messages_per_user() {
        let transport = MockTransport::new();
        transport
            .send_message(&UserId("u1".into()), "hello")
            .await
            .unwrap();
        transport
            .send_message(&UserId("u2".into()), "other")
            .await
            .unwrap();

        assert_eq!(transport.sent_count().await, 2);
        assert_eq!(transport.messages_for("u1").await, vec!["hello"]);
    }

    #[tokio::test]
    async fn injected_failure_is_returned_once() {
        let transport = MockTransport::new();
        transport
            .inject_failure(DripmailError::Conflict("competing poller".into()))
            .await;
        transport.inject_command("u1", "help", &[]).await;

        assert!(matches!(
            transport.next_command().await,
            Err(DripmailError::Conflict(_))
        ));
        assert_eq!(transport.next_command().await.unwrap().command, "help");
    }

    #[tokio::test]
    async fn next_command_waits_for_injection() {
        let transport = Arc::new(MockTransport::new());
        let injector = transport.clone();

        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            injector.inject_command("u1", "delayed", &[]).await;
        });

        let received = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            transport.next_command(),
        )
        .await
        .expect("next_command timed out")
        .unwrap();
        assert_eq!(received.command, "delayed");
    }

    #[tokio::test]
    async fn health_is_settable() {
        let transport = MockTransport::new();
        assert_eq!(
            transport.health_check().await.unwrap(),
            HealthStatus::Healthy
        );

        transport
            .set_health(MockHealth::Status(HealthStatus::Unhealthy("api down".into())))
            .await;
        assert_eq!(
            transport.health_check().await.unwrap(),
            HealthStatus::Unhealthy("api down".into())
        );
    }
}
