// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health monitor and poller supervisor.
//!
//! Probes the chat transport and the poll loop at a fixed interval. One
//! failed probe degrades, a run of consecutive failures triggers exactly one
//! restart, and exhausting the restart budget within the monitoring window
//! ends in the terminal `Failed` state. A transport conflict (a competing
//! poller) skips the degraded phase and restarts directly after a fixed
//! backoff.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use dripmail_agent::poller::ActivityTracker;
use dripmail_config::model::MonitorConfig;
use dripmail_core::error::DripmailError;
use dripmail_core::traits::ChatTransport;
use dripmail_core::types::HealthStatus;

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Healthy,
    Degraded,
    Restarting,
    Failed,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Healthy => "healthy",
            SupervisorState::Degraded => "degraded",
            SupervisorState::Restarting => "restarting",
            SupervisorState::Failed => "failed",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SupervisorState::Healthy,
            1 => SupervisorState::Degraded,
            2 => SupervisorState::Restarting,
            _ => SupervisorState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SupervisorState::Healthy => 0,
            SupervisorState::Degraded => 1,
            SupervisorState::Restarting => 2,
            SupervisorState::Failed => 3,
        }
    }
}

/// Shared, lock-free view of supervisor health for the gateway.
pub struct SupervisorStatus {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    activity: Arc<ActivityTracker>,
}

impl SupervisorStatus {
    pub fn new(activity: Arc<ActivityTracker>) -> Self {
        Self {
            state: AtomicU8::new(SupervisorState::Healthy.as_u8()),
            consecutive_failures: AtomicU32::new(0),
            activity,
        }
    }

    pub fn state(&self) -> SupervisorState {
        SupervisorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Seconds since the poll loop last handled an update.
    pub fn last_response_age_secs(&self) -> u64 {
        self.activity.last_update_age().as_secs()
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }
}

/// A running poll loop: its cancel token, join handle, and the tracker
/// holding in-flight command handlers.
pub struct PollerHandle {
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
    pub tracker: TaskTracker,
}

/// Builds and spawns a fresh poll loop. Called once at startup and again on
/// every restart.
pub type PollerFactory = Box<dyn Fn() -> PollerHandle + Send + Sync>;

/// Why the monitor loop returned.
#[derive(Debug, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// External shutdown was requested.
    Shutdown,
    /// The restart budget was exhausted; the process should exit non-zero.
    Failed,
}

pub struct HealthMonitor {
    transport: Arc<dyn ChatTransport>,
    factory: PollerFactory,
    config: MonitorConfig,
    status: Arc<SupervisorStatus>,
    poller: PollerHandle,
    restart_attempts: Vec<Instant>,
    is_restarting: bool,
}

impl HealthMonitor {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        factory: PollerFactory,
        config: MonitorConfig,
        status: Arc<SupervisorStatus>,
    ) -> Self {
        let poller = factory();
        Self {
            transport,
            factory,
            config,
            status,
            poller,
            restart_attempts: Vec::new(),
            is_restarting: false,
        }
    }

    /// The current poller's cancel token, so the coordinator can stop it.
    pub fn poller_cancel(&self) -> CancellationToken {
        self.poller.cancel.clone()
    }

    /// Probes at the configured interval until shutdown or terminal failure.
    pub async fn run(mut self, shutdown: CancellationToken) -> MonitorOutcome {
        let mut ticks =
            tokio::time::interval(Duration::from_secs(self.config.probe_interval_secs));
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh poller gets a
        // full interval before its first probe.
        ticks.tick().await;

        info!(
            interval_secs = self.config.probe_interval_secs,
            threshold = self.config.failure_threshold,
            "health monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("health monitor shutting down");
                    self.stop_poller().await;
                    return MonitorOutcome::Shutdown;
                }
                _ = ticks.tick() => {
                    if !self.probe().await {
                        self.status.set_state(SupervisorState::Failed);
                        error!("restart budget exhausted, supervisor giving up");
                        self.stop_poller().await;
                        return MonitorOutcome::Failed;
                    }
                }
            }
        }
    }

    /// One probe cycle. Returns `false` on terminal failure.
    async fn probe(&mut self) -> bool {
        // A conflict latched by the poll loop preempts everything else.
        if self.poller.tracker.is_closed() || self.conflict_pending() {
            return self.handle_conflict().await;
        }

        let healthy = match self.transport.health_check().await {
            Ok(HealthStatus::Healthy) => !self.poller.join.is_finished(),
            Ok(HealthStatus::Degraded(reason)) => {
                warn!(reason = reason.as_str(), "transport degraded");
                false
            }
            Ok(HealthStatus::Unhealthy(reason)) => {
                warn!(reason = reason.as_str(), "transport unhealthy");
                false
            }
            Err(DripmailError::Conflict(detail)) => {
                warn!(detail = detail.as_str(), "transport reports competing poller");
                return self.handle_conflict().await;
            }
            Err(e) => {
                warn!(error = %e, "transport health check failed");
                false
            }
        };

        if healthy {
            if self.status.state() != SupervisorState::Healthy {
                info!("probe succeeded, back to healthy");
            }
            self.status.set_state(SupervisorState::Healthy);
            self.status.reset_failures();
            return true;
        }

        let failures = self.status.record_failure();
        self.status.set_state(SupervisorState::Degraded);
        debug!(
            failures,
            threshold = self.config.failure_threshold,
            age_secs = self.status.last_response_age_secs(),
            "probe failed"
        );

        if failures >= self.config.failure_threshold && !self.is_restarting {
            return self.restart().await;
        }
        true
    }

    fn conflict_pending(&self) -> bool {
        // The poll loop latches a conflict and exits; a finished poller with
        // the latch set is the conflict path, not a crash.
        self.status.activity.take_conflict()
    }

    /// Conflict path: fixed backoff, then straight to restarting. The
    /// degraded phase is skipped since waiting out more probes would only
    /// prolong the fight over the poll slot.
    async fn handle_conflict(&mut self) -> bool {
        warn!(
            backoff_secs = self.config.conflict_backoff_secs,
            "poller conflict, backing off before restart"
        );
        self.status.set_state(SupervisorState::Restarting);
        tokio::time::sleep(Duration::from_secs(self.config.conflict_backoff_secs)).await;
        self.restart().await
    }

    /// Tears down the current poller and spawns a fresh one.
    ///
    /// Returns `false` once the attempts budget within the window is spent.
    async fn restart(&mut self) -> bool {
        self.is_restarting = true;
        self.status.set_state(SupervisorState::Restarting);

        let window = Duration::from_secs(self.config.restart_window_secs);
        let now = Instant::now();
        self.restart_attempts.retain(|t| now.duration_since(*t) < window);
        if self.restart_attempts.len() >= self.config.max_restart_attempts as usize {
            self.is_restarting = false;
            return false;
        }
        self.restart_attempts.push(now);

        info!(
            attempt = self.restart_attempts.len(),
            max = self.config.max_restart_attempts,
            "restarting poll loop"
        );
        self.stop_poller().await;
        self.poller = (self.factory)();
        // Consume a latch the dying poller may have set during teardown.
        self.status.activity.take_conflict();

        let recovered = matches!(
            self.transport.health_check().await,
            Ok(HealthStatus::Healthy)
        );
        self.is_restarting = false;
        if recovered {
            info!("poll loop restarted, transport healthy");
            self.status.set_state(SupervisorState::Healthy);
            self.status.reset_failures();
        } else {
            warn!("poll loop restarted but transport still unhealthy");
            self.status.set_state(SupervisorState::Degraded);
        }
        true
    }

    /// Cancels the poller and drains in-flight handlers, bounded.
    async fn stop_poller(&mut self) {
        self.poller.cancel.cancel();
        let drain = Duration::from_secs(self.config.drain_timeout_secs);
        self.poller.tracker.close();
        if tokio::time::timeout(drain, self.poller.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                drain_secs = self.config.drain_timeout_secs,
                "drain timeout reached, abandoning in-flight handlers"
            );
        }
        if tokio::time::timeout(drain, &mut self.poller.join)
            .await
            .is_err()
        {
            warn!("poll loop did not stop in time, aborting");
            self.poller.join.abort();
        }
    }
}
