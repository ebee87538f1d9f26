// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the dripmail bot.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the dripmail workspace. The mailbox backend
//! adapters and the chat transport implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::DripmailError;
pub use traits::{ChatTransport, MailboxBackend};
pub use types::{
    CommandRequest, HealthStatus, InboundMail, MailboxMessage, MailboxSession,
    ProvisionedMailbox, SessionToken, UserId,
};
