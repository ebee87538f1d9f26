// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dripmail serve` command implementation.
//!
//! Wires the whole agent together: instance lock, mailbox backend, session
//! store, dispatcher poll loop, inbound-mail notifier, health monitor, and
//! the gateway. Supports graceful shutdown via signal handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use dripmail_agent::poller::{ActivityTracker, BotLoop};
use dripmail_agent::{run_notifier, Dispatcher};
use dripmail_config::model::DripmailConfig;
use dripmail_core::error::DripmailError;
use dripmail_core::traits::ChatTransport;
use dripmail_sessions::SessionStore;
use dripmail_supervisor::{
    install_signal_handler, HealthMonitor, InstanceLock, MonitorOutcome, PollerFactory,
    PollerHandle, SupervisorStatus,
};

use crate::transport::ConsoleTransport;

/// Resolves the lock file path: explicit config override, else the platform
/// temp directory.
fn lock_path(config: &DripmailConfig) -> PathBuf {
    match &config.agent.lock_path {
        Some(path) => PathBuf::from(path),
        None => std::env::temp_dir().join("dripmail.lock"),
    }
}

/// Runs the `dripmail serve` command.
///
/// Startup order: acquire the instance lock, initialize the backend, spawn
/// the poll loop and notifier, start the health monitor, then the gateway.
/// Returns an error (and the process exits non-zero) when another instance
/// is running or the supervisor gives up.
pub async fn run_serve(config: DripmailConfig) -> Result<(), DripmailError> {
    init_tracing(&config.agent.log_level);

    info!("starting dripmail serve");

    // Single-instance guard first; everything else is pointless without it.
    let mut lock = InstanceLock::acquire(&lock_path(&config))?;

    let shutdown = install_signal_handler();

    // Mailbox backend (plus the SMTP accept loop for the listener variant).
    let (backend, smtp_listener) =
        dripmail_mailbox::build_backend(&config.mailbox, shutdown.child_token()).await?;
    if let Some(listener) = smtp_listener {
        tokio::spawn(listener.run());
    }

    let store = Arc::new(SessionStore::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        Arc::clone(&backend),
        Duration::from_secs(config.bot.command_timeout_secs),
    ));

    if config.bot.token.is_some() {
        warn!("bot.token is set but the console transport does not use it");
    }
    let transport: Arc<dyn ChatTransport> = Arc::new(ConsoleTransport::new());

    let activity = Arc::new(ActivityTracker::new());
    let status = Arc::new(SupervisorStatus::new(Arc::clone(&activity)));

    // Inbound-mail notifier, for backends with push delivery.
    if let Some(events) = backend.subscribe() {
        tokio::spawn(run_notifier(
            events,
            Arc::clone(&store),
            Arc::clone(&transport),
            shutdown.child_token(),
        ));
    }

    // The monitor owns poller lifecycles through this factory, spawning one
    // at startup and a fresh one on every restart.
    let factory: PollerFactory = {
        let transport = Arc::clone(&transport);
        let shutdown = shutdown.clone();
        let activity = Arc::clone(&activity);
        Box::new(move || {
            let cancel = shutdown.child_token();
            let bot = BotLoop::new(
                Arc::clone(&transport),
                Arc::clone(&dispatcher),
                Arc::clone(&activity),
                cancel.clone(),
            );
            let tracker = bot.task_tracker();
            let join = tokio::spawn(bot.run());
            PollerHandle {
                cancel,
                join,
                tracker,
            }
        })
    };

    let monitor = HealthMonitor::new(
        Arc::clone(&transport),
        factory,
        config.monitor.clone(),
        Arc::clone(&status),
    );
    let monitor_task = tokio::spawn(monitor.run(shutdown.clone()));

    if config.gateway.enabled {
        let (serve, _) =
            dripmail_gateway::start_server(&config.gateway, Arc::clone(&status), shutdown.clone())
                .await?;
        tokio::spawn(serve);
    }

    info!("dripmail is up, send /help on the console");

    // The monitor returns on signal-driven shutdown or terminal failure; it
    // has already cancelled and drained the poller either way.
    let outcome = monitor_task
        .await
        .map_err(|e| DripmailError::Internal(format!("monitor task panicked: {e}")))?;

    // Teardown is idempotent: the token is already cancelled on the signal
    // path, and release() is a no-op the second time.
    shutdown.cancel();
    lock.release();

    match outcome {
        MonitorOutcome::Shutdown => {
            info!("dripmail stopped");
            Ok(())
        }
        MonitorOutcome::Failed => Err(DripmailError::Internal(
            "supervisor restart budget exhausted".to_string(),
        )),
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dripmail={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
