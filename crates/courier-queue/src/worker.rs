// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker: polls one queue and dispatches jobs to a handler with a
//! bounded concurrency cap.
//!
//! Shutdown is cooperative: on cancellation the worker stops dequeuing,
//! then waits for in-flight jobs to drain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::CourierError;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{FailOutcome, Job, JobQueue};

/// Handler for jobs pulled off a queue. Must be idempotent: delivery is
/// at-least-once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), CourierError>;
}

/// Polls a single queue and runs jobs through the handler.
pub struct JobWorker {
    queue: JobQueue,
    queue_name: String,
    concurrency: usize,
    poll_interval: Duration,
    handler: Arc<dyn JobHandler>,
}

impl JobWorker {
    pub fn new(queue: JobQueue, queue_name: &str, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            queue,
            concurrency: crate::names::concurrency(queue_name),
            queue_name: queue_name.to_string(),
            poll_interval: Duration::from_millis(200),
            handler,
        }
    }

    /// Override the poll interval (tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawn the worker loop. Runs until `cancel` fires, then drains.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                queue = self.queue_name.as_str(),
                concurrency = self.concurrency,
                "queue worker started"
            );
            let semaphore = Arc::new(Semaphore::new(self.concurrency));

            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let permit = tokio::select! {
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                    _ = cancel.cancelled() => break,
                };

                let job = match self.queue.dequeue(&self.queue_name).await {
                    Ok(Some(job)) => job,
                    Ok(None) => {
                        drop(permit);
                        tokio::select! {
                            _ = tokio::time::sleep(self.poll_interval) => continue,
                            _ = cancel.cancelled() => break,
                        }
                    }
                    Err(e) => {
                        drop(permit);
                        warn!(queue = self.queue_name.as_str(), error = %e, "dequeue failed");
                        tokio::select! {
                            _ = tokio::time::sleep(self.poll_interval) => continue,
                            _ = cancel.cancelled() => break,
                        }
                    }
                };

                let queue = self.queue.clone();
                let handler = self.handler.clone();
                let queue_name = self.queue_name.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    debug!(
                        queue = queue_name.as_str(),
                        job_id = job.job_id.as_str(),
                        attempt = job.attempts + 1,
                        "job started"
                    );
                    match handler.handle(&job).await {
                        Ok(()) => {
                            if let Err(e) = queue.ack(job.id).await {
                                error!(job_id = job.job_id.as_str(), error = %e, "ack failed");
                            }
                        }
                        Err(e) => {
                            warn!(
                                queue = queue_name.as_str(),
                                job_id = job.job_id.as_str(),
                                error = %e,
                                "job failed"
                            );
                            match queue.fail(job.id, &e.to_string()).await {
                                Ok(FailOutcome::Dead) => {
                                    error!(
                                        queue = queue_name.as_str(),
                                        job_id = job.job_id.as_str(),
                                        correlation_id = job.correlation_id.as_deref().unwrap_or(""),
                                        "job dead-lettered"
                                    );
                                }
                                Ok(FailOutcome::Retried { run_at }) => {
                                    debug!(
                                        job_id = job.job_id.as_str(),
                                        run_at = run_at.as_str(),
                                        "job re-pended"
                                    );
                                }
                                Err(e) => {
                                    error!(job_id = job.job_id.as_str(), error = %e, "fail() failed");
                                }
                            }
                        }
                    }
                });
            }

            // Drain: wait for all permits, i.e. all in-flight jobs.
            let _ = semaphore.acquire_many(self.concurrency as u32).await;
            info!(queue = self.queue_name.as_str(), "queue worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EnqueueRequest;
    use courier_storage::Database;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingHandler {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> Result<(), CourierError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn setup() -> (JobQueue, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (JobQueue::new(db), dir)
    }

    #[tokio::test]
    async fn worker_processes_and_acks() {
        let (queue, _dir) = setup().await;
        queue
            .enqueue(EnqueueRequest::new("updates", "u-1", "{}"))
            .await
            .unwrap();

        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let worker = JobWorker::new(queue.clone(), "updates", handler.clone())
            .with_poll_interval(Duration::from_millis(20))
            .spawn(cancel.clone());

        // Wait until the queue drains.
        for _ in 0..100 {
            if queue.depth().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        worker.await.unwrap();

        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn worker_stops_on_cancel() {
        let (queue, _dir) = setup().await;
        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let worker = JobWorker::new(queue, "updates", handler)
            .with_poll_interval(Duration::from_millis(10))
            .spawn(cancel.clone());

        cancel.cancel();
        // Must terminate promptly with an idle queue.
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
