// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per owned entity.

pub mod approvals;
pub mod messages;
pub mod prefs;
pub mod sessions;
pub mod updates;
