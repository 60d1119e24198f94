// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-polling update feed.
//!
//! Pull-mode transport: fetched updates flow through the same ingestion
//! contract as webhook posts, so dedupe, persistence, and recovery
//! behave identically in both run modes.

use courier_ingest::Ingestor;
use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Long-poll wait passed to the Bot API, seconds.
const POLL_TIMEOUT_SECS: u32 = 25;

/// Run the polling loop until cancelled.
pub async fn run_polling(bot: Bot, ingestor: Ingestor, cancel: CancellationToken) {
    info!("long-polling started");
    let mut offset: i32 = 0;

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery]);

        let updates = tokio::select! {
            result = request => result,
            _ = cancel.cancelled() => break,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "get_updates failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => continue,
                    _ = cancel.cancelled() => break,
                }
            }
        };

        for update in updates {
            offset = offset.max(update.id.0 as i32 + 1);
            let update_id = i64::from(update.id.0);
            let payload = match serde_json::to_string(&update) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(update_id, error = %e, "unserializable update skipped");
                    continue;
                }
            };
            match ingestor.ingest(update_id, &payload).await {
                Ok(outcome) => debug!(update_id, ?outcome, "update ingested"),
                Err(e) => warn!(update_id, error = %e, "ingest failed"),
            }
        }
    }
    info!("long-polling stopped");
}
