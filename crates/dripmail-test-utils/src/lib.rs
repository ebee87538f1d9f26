// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles for the dripmail workspace.

pub mod mock_backend;
pub mod mock_transport;

pub use mock_backend::MockBackend;
pub use mock_transport::{MockHealth, MockTransport};
