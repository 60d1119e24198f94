// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Courier bot runtime.
//!
//! Mock transport, provider, and tools plus a full-pipeline harness for
//! CI-runnable end-to-end tests without external services.

pub mod harness;
pub mod mock_provider;
pub mod mock_tools;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_provider::{MockProvider, ScriptEvent};
pub use mock_tools::{BalanceTool, SendTool};
pub use mock_transport::MockTransport;
