// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue operations on the shared SQLite database.
//!
//! Delivery is at-least-once; handlers must be idempotent. FIFO within a
//! queue by insertion id, gated by `run_at` for delayed jobs. Producer
//! dedup: inserting an existing `job_id` is a no-op.

use std::time::Duration;

use chrono::Utc;
use courier_core::CourierError;
use courier_storage::database::{map_tr_err, Database};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// A dequeued job, locked for processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub queue_name: String,
    pub job_id: String,
    pub payload: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub correlation_id: Option<String>,
}

/// Producer-side enqueue request.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub queue: String,
    /// Custom identifier for producer-side deduplication.
    pub job_id: String,
    pub payload: String,
    /// Wall-clock delay before the job becomes deliverable.
    pub delay: Duration,
    pub max_attempts: i32,
    pub correlation_id: Option<String>,
}

impl EnqueueRequest {
    /// Immediate job with the queue's default attempt budget.
    pub fn new(queue: &str, job_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            queue: queue.to_string(),
            job_id: job_id.into(),
            payload: payload.into(),
            delay: Duration::ZERO,
            max_attempts: crate::names::max_attempts(queue),
            correlation_id: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Outcome of [`JobQueue::fail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-pended with backoff; deliverable again at the given ISO time.
    Retried { run_at: String },
    /// Attempt budget exhausted; a dead-letter row was written.
    Dead,
}

/// Exponential backoff: base 1 s, factor 2, capped to keep the shift sane.
fn backoff_delay(completed_attempts: i32) -> Duration {
    let exp = (completed_attempts - 1).clamp(0, 6) as u32;
    Duration::from_secs(1u64 << exp)
}

fn iso_in(delay: Duration) -> String {
    (Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default())
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Handle to the durable queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    db: Database,
}

impl JobQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Enqueue a job. Returns false when `job_id` already exists
    /// (producer-side dedup; the existing job is left untouched).
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<bool, CourierError> {
        let run_at = iso_in(request.delay);
        self.db
            .connection()
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO jobs
                         (queue_name, job_id, payload, max_attempts, run_at, correlation_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        request.queue,
                        request.job_id,
                        request.payload,
                        request.max_attempts,
                        run_at,
                        request.correlation_id,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Dequeue the next deliverable job from the named queue.
    ///
    /// Atomically selects the oldest pending entry whose `run_at` has
    /// passed and marks it "processing" with a 5-minute lock. Returns
    /// `None` when nothing is deliverable.
    pub async fn dequeue(&self, queue: &str) -> Result<Option<Job>, CourierError> {
        let queue = queue.to_string();
        let now = iso_in(Duration::ZERO);
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;

                let result = {
                    let mut stmt = tx.prepare(
                        "SELECT id, queue_name, job_id, payload, attempts, max_attempts,
                                correlation_id
                         FROM jobs
                         WHERE queue_name = ?1 AND status = 'pending' AND run_at <= ?2
                         ORDER BY id ASC
                         LIMIT 1",
                    )?;
                    stmt.query_row(params![queue, now], |row| {
                        Ok(Job {
                            id: row.get(0)?,
                            queue_name: row.get(1)?,
                            job_id: row.get(2)?,
                            payload: row.get(3)?,
                            attempts: row.get(4)?,
                            max_attempts: row.get(5)?,
                            correlation_id: row.get(6)?,
                        })
                    })
                };

                match result {
                    Ok(job) => {
                        tx.execute(
                            "UPDATE jobs SET status = 'processing',
                                 locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                             WHERE id = ?1",
                            params![job.id],
                        )?;
                        tx.commit()?;
                        Ok(Some(job))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        tx.commit()?;
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Acknowledge successful processing.
    pub async fn ack(&self, id: i64) -> Result<(), CourierError> {
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE jobs SET status = 'completed',
                         locked_until = NULL,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Record a failed attempt.
    ///
    /// Within budget the job re-pends with exponential backoff. At budget
    /// exhaustion it goes `dead` and a dead-letter row is written in the
    /// same transaction.
    pub async fn fail(&self, id: i64, error: &str) -> Result<FailOutcome, CourierError> {
        let error = error.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;

                let (queue_name, job_id, payload, attempts, max_attempts, correlation_id): (
                    String,
                    String,
                    String,
                    i32,
                    i32,
                    Option<String>,
                ) = tx.query_row(
                    "SELECT queue_name, job_id, payload, attempts, max_attempts, correlation_id
                     FROM jobs WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )?;

                let new_attempts = attempts + 1;
                let outcome = if new_attempts >= max_attempts {
                    tx.execute(
                        "UPDATE jobs SET status = 'dead', attempts = ?1,
                             locked_until = NULL, last_error = ?2,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?3",
                        params![new_attempts, error, id],
                    )?;
                    tx.execute(
                        "INSERT INTO dead_letters
                             (queue_name, job_id, payload, reason, correlation_id)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![queue_name, job_id, payload, error, correlation_id],
                    )?;
                    FailOutcome::Dead
                } else {
                    let run_at = iso_in(backoff_delay(new_attempts));
                    tx.execute(
                        "UPDATE jobs SET status = 'pending', attempts = ?1,
                             locked_until = NULL, last_error = ?2, run_at = ?3,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?4",
                        params![new_attempts, error, run_at.clone(), id],
                    )?;
                    FailOutcome::Retried { run_at }
                };

                tx.commit()?;
                Ok(outcome)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Jobs not yet completed across all queues (readiness signal).
    pub async fn depth(&self) -> Result<i64, CourierError> {
        self.db
            .connection()
            .call(|conn| {
                let depth = conn.query_row(
                    "SELECT COUNT(*) FROM jobs WHERE status IN ('pending', 'processing')",
                    [],
                    |row| row.get(0),
                )?;
                Ok(depth)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Dead-letter rows, newest first (operational tooling).
    pub async fn list_dead_letters(
        &self,
        limit: i64,
    ) -> Result<Vec<(String, String, String)>, CourierError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT job_id, reason, COALESCE(correlation_id, '')
                     FROM dead_letters ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                let mut letters = Vec::new();
                for row in rows {
                    letters.push(row?);
                }
                Ok(letters)
            })
            .await
            .map_err(map_tr_err)
    }
}
