// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline: transport -> dedupe -> persist -> enqueue.
//!
//! Push and pull transports share one contract: a durable insert keyed by
//! the platform `update_id`, then an `updates` job keyed `update-<id>`.
//! Push mode acknowledges on the durable insert alone; if the enqueue
//! fails the recovery sweep re-enqueues the row. No update a transport
//! handed us is ever lost to a queue outage.

use std::time::Duration;

use courier_core::types::UpdateStatus;
use courier_core::CourierError;
use courier_queue::{names, EnqueueRequest, JobQueue};
use courier_storage::queries::updates;
use courier_storage::Database;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Recovery sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// Per-tick batch cap for the recovery sweep.
pub const SWEEP_BATCH: i64 = 200;

/// Outcome of ingesting one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First sight: persisted and enqueued.
    Ingested,
    /// Persisted, but the enqueue failed; the recovery sweep will retry.
    Deferred,
    /// The update id was seen before; nothing enqueued.
    Duplicate,
}

impl IngestOutcome {
    pub fn is_duplicate(self) -> bool {
        matches!(self, IngestOutcome::Duplicate)
    }
}

/// Shared ingestion contract for webhook and polling transports.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    queue: JobQueue,
}

impl Ingestor {
    pub fn new(db: Database, queue: JobQueue) -> Self {
        Self { db, queue }
    }

    /// Ingest a raw update. Duplicate ids are acknowledged and dropped;
    /// fresh ids are persisted, then enqueued, then marked `enqueued`.
    pub async fn ingest(&self, update_id: i64, payload: &str) -> Result<IngestOutcome, CourierError> {
        let outcome = updates::try_insert(&self.db, update_id, payload).await?;
        if !outcome.inserted {
            debug!(update_id, "duplicate update acknowledged");
            return Ok(IngestOutcome::Duplicate);
        }

        match self.enqueue_and_mark(update_id, payload).await {
            Ok(()) => Ok(IngestOutcome::Ingested),
            Err(e) => {
                // The durable insert stands; the sweep owns the retry.
                warn!(update_id, error = %e, "enqueue failed after persist, deferring to sweep");
                Ok(IngestOutcome::Deferred)
            }
        }
    }

    async fn enqueue_and_mark(&self, update_id: i64, payload: &str) -> Result<(), CourierError> {
        self.queue
            .enqueue(EnqueueRequest::new(
                names::UPDATES,
                format!("update-{update_id}"),
                payload.to_string(),
            ))
            .await?;
        updates::mark_status(&self.db, update_id, UpdateStatus::Enqueued, None).await?;
        Ok(())
    }

    /// One recovery tick: re-enqueue updates stuck in `received`.
    ///
    /// A row whose enqueue fails is re-marked `received` so the next
    /// tick retries it. Returns the number of rows recovered.
    pub async fn recover_once(&self) -> Result<usize, CourierError> {
        let stuck = updates::list_received_for_recovery(&self.db, SWEEP_BATCH).await?;
        if stuck.is_empty() {
            return Ok(0);
        }

        let mut recovered = 0;
        for update in stuck {
            // Enqueue before marking: a crash in between leaves a
            // received row plus a job the update-<id> key dedupes on the
            // next tick. Marking first could strand an enqueued row with
            // no job.
            match self
                .queue
                .enqueue(EnqueueRequest::new(
                    names::UPDATES,
                    format!("update-{}", update.update_id),
                    update.payload.clone(),
                ))
                .await
            {
                Ok(_) => {
                    if let Err(e) = updates::mark_status(
                        &self.db,
                        update.update_id,
                        UpdateStatus::Enqueued,
                        None,
                    )
                    .await
                    {
                        // Stays received; the next tick re-marks it.
                        warn!(update_id = update.update_id, error = %e, "recovery mark failed");
                        continue;
                    }
                    recovered += 1;
                }
                Err(e) => {
                    warn!(update_id = update.update_id, error = %e, "recovery enqueue failed");
                }
            }
        }
        if recovered > 0 {
            info!(recovered, "recovery sweep re-enqueued stuck updates");
        }
        Ok(recovered)
    }

    /// Spawn the recovery sweep: one tick at start, then every 5 s until
    /// cancelled.
    pub fn spawn_recovery_sweep(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("recovery sweep started");
            loop {
                if let Err(e) = self.recover_once().await {
                    warn!(error = %e, "recovery sweep tick failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            info!("recovery sweep stopped");
        })
    }
}
