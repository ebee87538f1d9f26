// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the pluggable seams of the dripmail bot.
//!
//! Both traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod backend;
pub mod transport;

pub use backend::MailboxBackend;
pub use transport::ChatTransport;
