// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Courier bot runtime.
//!
//! Owns the durable entities: processed updates, sessions, messages,
//! approvals, preference layers, plus the schema shared with the job
//! queue and audit chain. All writes are serialized through a single
//! tokio-rusqlite background connection.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::{now_iso, Database};
pub use models::{ApprovalRow, MessageRow, ProcessedUpdate, SessionRow};
