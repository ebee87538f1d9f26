// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transport poll loop: receives commands, fans each one out to the
//! dispatcher, and reports liveness to the health monitor.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use dripmail_core::error::DripmailError;
use dripmail_core::traits::ChatTransport;

use crate::dispatcher::Dispatcher;

/// Pause after a non-conflict transport error before polling again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shared liveness signal between the poll loop and the health monitor.
///
/// `touch` is called after each successfully handled update; the monitor
/// reads the age of the last touch. A detected poller conflict is latched
/// here and consumed once by the monitor.
pub struct ActivityTracker {
    last_update_ms: AtomicI64,
    conflict: AtomicBool,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_update_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            conflict: AtomicBool::new(false),
        }
    }

    /// Records a successfully handled update.
    pub fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Age of the last successfully handled update.
    pub fn last_update_age(&self) -> Duration {
        let last = self.last_update_ms.load(Ordering::Relaxed);
        let elapsed_ms = (Utc::now().timestamp_millis() - last).max(0);
        Duration::from_millis(elapsed_ms as u64)
    }

    /// Latches a detected poller conflict.
    pub fn flag_conflict(&self) {
        self.conflict.store(true, Ordering::SeqCst);
    }

    /// Consumes the conflict latch, returning whether one was pending.
    pub fn take_conflict(&self) -> bool {
        self.conflict.swap(false, Ordering::SeqCst)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The long-poll loop over the chat transport.
///
/// Each received command is handled in its own task so a slow handler never
/// blocks receipt of the next update; in-flight handlers are tracked for a
/// bounded drain at shutdown.
pub struct BotLoop {
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<Dispatcher>,
    activity: Arc<ActivityTracker>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl BotLoop {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<Dispatcher>,
        activity: Arc<ActivityTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            activity,
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    /// Tracker holding the in-flight command handlers, for shutdown drain.
    pub fn task_tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    pub async fn run(self) {
        info!("bot poll loop started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("bot poll loop cancelled");
                    break;
                }
                next = self.transport.next_command() => match next {
                    Ok(request) => {
                        let transport = Arc::clone(&self.transport);
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let activity = Arc::clone(&self.activity);
                        self.tracker.spawn(async move {
                            let reply = dispatcher.dispatch(&request).await;
                            if let Err(e) =
                                transport.send_message(&request.user_id, &reply).await
                            {
                                warn!(
                                    user = %request.user_id,
                                    error = %e,
                                    "failed to deliver reply"
                                );
                            }
                            activity.touch();
                        });
                    }
                    Err(DripmailError::Conflict(detail)) => {
                        warn!(detail = detail.as_str(), "competing poller detected, stopping loop");
                        self.activity.flag_conflict();
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "transport receive error");
                        tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                    }
                }
            }
        }
        self.tracker.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dripmail_sessions::SessionStore;
    use dripmail_test_utils::{MockBackend, MockTransport};

    fn bot_loop(
        transport: Arc<MockTransport>,
    ) -> (BotLoop, Arc<ActivityTracker>, CancellationToken) {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(SessionStore::new()),
            Arc::new(MockBackend::new()),
            Duration::from_secs(5),
        ));
        let activity = Arc::new(ActivityTracker::new());
        let cancel = CancellationToken::new();
        let bot = BotLoop::new(
            transport,
            dispatcher,
            Arc::clone(&activity),
            cancel.clone(),
        );
        (bot, activity, cancel)
    }

    #[tokio::test]
    async fn replies_are_sent_back_through_the_transport() {
        let transport = Arc::new(MockTransport::new());
        let (bot, _, cancel) = bot_loop(Arc::clone(&transport));
        let tracker = bot.task_tracker();
        let handle = tokio::spawn(bot.run());

        transport.inject_command("u1", "help", &[]).await;
        transport.inject_command("u1", "newmail", &[]).await;

        // Give both handlers a chance to complete, then stop the loop.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();
        tracker.wait().await;

        let messages = transport.messages_for("u1").await;
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Dripmail Bot Help"));
        assert!(messages[1].contains("mock-0@mock.example"));
    }

    #[tokio::test]
    async fn conflict_stops_the_loop_and_latches() {
        let transport = Arc::new(MockTransport::new());
        let (bot, activity, _cancel) = bot_loop(Arc::clone(&transport));
        let handle = tokio::spawn(bot.run());

        transport
            .inject_failure(DripmailError::Conflict("another poller".into()))
            .await;

        handle.await.unwrap();
        assert!(activity.take_conflict());
        assert!(!activity.take_conflict(), "latch is consumed once");
    }

    #[tokio::test]
    async fn transient_receive_errors_do_not_stop_the_loop() {
        let transport = Arc::new(MockTransport::new());
        let (bot, _, cancel) = bot_loop(Arc::clone(&transport));
        let handle = tokio::spawn(bot.run());

        transport
            .inject_failure(DripmailError::Transport {
                message: "flaky network".into(),
                source: None,
            })
            .await;
        transport.inject_command("u1", "help", &[]).await;

        // The loop sleeps briefly after the error, then handles the command.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(transport.sent_count().await, 1);
    }

    #[tokio::test]
    async fn activity_touch_resets_age() {
        let activity = ActivityTracker::new();
        assert!(activity.last_update_age() < Duration::from_secs(1));
        activity.touch();
        assert!(activity.last_update_age() < Duration::from_secs(1));
    }
}
