// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent turn execution for the Courier bot runtime.
//!
//! Streams LLM output to a draft surface, runs policy-wrapped tools,
//! parks sensitive calls behind approvals, and post-processes the
//! response before it reaches the user.

pub mod executor;
pub mod policy;
pub mod prompt;
pub mod toolwrap;
pub mod worker;

pub use executor::{TurnExecutor, TurnOutput};
pub use worker::TurnJobHandler;
pub use policy::{PolicyInput, PolicyOutcome};
pub use prompt::{build_system_prompt, PromptParams};
pub use toolwrap::{policy_catalog, PolicyTool, ToolPolicy};
