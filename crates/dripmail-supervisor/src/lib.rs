// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process supervision: the single-instance lock, the health monitor that
//! restarts a wedged poll loop, and signal-driven shutdown.

pub mod lock;
pub mod monitor;
pub mod shutdown;

pub use lock::InstanceLock;
pub use monitor::{
    HealthMonitor, MonitorOutcome, PollerFactory, PollerHandle, SupervisorState, SupervisorStatus,
};
pub use shutdown::install_signal_handler;
