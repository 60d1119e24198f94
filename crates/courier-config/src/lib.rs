// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Courier bot runtime.
//!
//! Layered loading (defaults, system, XDG, local, environment) via Figment,
//! strict unknown-key rejection, and a boot-time validation pass.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str, validate};
pub use model::{CourierConfig, LimitsConfig, RunMode};
