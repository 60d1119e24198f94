// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` implementation.
//!
//! Operational snapshot: queue depth, recent dead letters, and a full
//! audit chain verification.

use courier_audit::AuditLog;
use courier_config::CourierConfig;
use courier_core::CourierError;
use courier_queue::JobQueue;
use courier_storage::Database;

/// Run the `courier status` command.
pub async fn run_status(config: CourierConfig) -> Result<(), CourierError> {
    let db = Database::open(&config.storage.database_path).await?;
    let queue = JobQueue::new(db.clone());
    let audit = AuditLog::new(db.clone());

    let depth = queue.depth().await?;
    println!("queue depth: {depth}");

    let dead_letters = queue.list_dead_letters(10).await?;
    println!("dead letters: {}", dead_letters.len());
    for (job_id, reason, correlation_id) in &dead_letters {
        println!("  {job_id} [{correlation_id}] {reason}");
    }

    let report = audit.verify_chain().await?;
    match report.first_divergence {
        None => println!("audit chain: intact ({} events)", report.checked),
        Some(id) => {
            println!(
                "audit chain: BROKEN at event {id} ({} verified before it)",
                report.checked
            );
            db.close().await?;
            return Err(CourierError::Audit(format!(
                "hash chain divergence at event {id}"
            )));
        }
    }

    db.close().await?;
    Ok(())
}
