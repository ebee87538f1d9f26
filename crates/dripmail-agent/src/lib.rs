// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bot agent: command dispatcher, transport poll loop, and the
//! inbound-mail notifier worker.

pub mod dispatcher;
pub mod notifier;
pub mod poller;

pub use dispatcher::Dispatcher;
pub use notifier::run_notifier;
pub use poller::{ActivityTracker, BotLoop};
