// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat transport trait: the bot's only view of the chat platform.
//!
//! The concrete transport (long polling, webhooks, a test double) lives
//! outside this workspace's core; the dispatcher and supervisor consume it
//! solely through this interface.

use async_trait::async_trait;

use crate::error::DripmailError;
use crate::types::{CommandRequest, HealthStatus, UserId};

/// Bidirectional interface to the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Waits for the next user command.
    ///
    /// Long-poll semantics: pends until a command arrives or the transport
    /// fails. A transport that detects a competing poller returns
    /// `DripmailError::Conflict`, which the supervisor treats specially.
    async fn next_command(&self) -> Result<CommandRequest, DripmailError>;

    /// Delivers a text message to a user.
    async fn send_message(&self, user: &UserId, text: &str) -> Result<(), DripmailError>;

    /// Probes transport connectivity (can the bot reach the chat API).
    async fn health_check(&self) -> Result<HealthStatus, DripmailError>;
}
