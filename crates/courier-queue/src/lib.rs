// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue for the Courier bot runtime.
//!
//! At-least-once delivery, FIFO within a queue, delayed jobs, exponential
//! backoff, producer-side dedup ids, and dead-letter capture, all on the
//! shared SQLite database.

pub mod names;
pub mod queue;
pub mod worker;

pub use queue::{EnqueueRequest, FailOutcome, Job, JobQueue};
pub use worker::{JobHandler, JobWorker};
