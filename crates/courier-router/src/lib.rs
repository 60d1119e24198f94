// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update routing for the Courier bot runtime.
//!
//! Decodes stored updates, parses callback data and commands, gates
//! admission through the rate limiter, and materializes agent turns.

pub mod callback;
pub mod commands;
pub mod decode;
pub mod router;
pub mod worker;

pub use callback::{ApprovalAction, CallbackAction, SettingsSection, WalletAction};
pub use commands::Command;
pub use decode::decode;
pub use router::{Effect, RouteOutcome, Router, RouterConfig};
pub use worker::UpdateJobHandler;
