// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Courier bot runtime.
//!
//! Thin by design: persist-then-ack webhook intake, liveness and
//! readiness probes, and a token-protected manual replay endpoint.

pub mod handlers;
pub mod server;

pub use server::{build_router, start_server, GatewayState, ServerConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::Json;
    use courier_ingest::Ingestor;
    use courier_kv::MemoryKv;
    use courier_queue::{names, JobQueue};
    use courier_storage::queries::updates;
    use courier_storage::Database;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn state(webhook_secret: Option<&str>, admin_token: Option<&str>) -> (GatewayState, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let queue = JobQueue::new(db.clone());
        let state = GatewayState {
            ingestor: Ingestor::new(db.clone(), queue.clone()),
            db,
            kv: Arc::new(MemoryKv::new()),
            queue,
            webhook_secret: webhook_secret.map(str::to_string),
            admin_token: admin_token.map(str::to_string),
        };
        (state, dir)
    }

    fn update_body(update_id: i64) -> serde_json::Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": 1,
                "chat": {"id": 100, "type": "private"},
                "from": {"id": 200},
                "text": "hello",
            }
        })
    }

    #[tokio::test]
    async fn webhook_persists_acks_and_enqueues() {
        let (state, _dir) = state(Some("s3cret"), None).await;

        let response = handlers::post_webhook_with_secret(
            State(state.clone()),
            Path("s3cret".to_string()),
            HeaderMap::new(),
            Json(update_body(42)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let row = updates::get_update(&state.db, 42).await.unwrap().unwrap();
        assert_eq!(
            row.status,
            courier_core::types::UpdateStatus::Enqueued
        );
        let job = state.queue.dequeue(names::UPDATES).await.unwrap().unwrap();
        assert_eq!(job.job_id, "update-42");
    }

    #[tokio::test]
    async fn duplicate_webhook_reports_duplicate_without_new_job() {
        let (state, _dir) = state(Some("s3cret"), None).await;

        for _ in 0..2 {
            let response = handlers::post_webhook_with_secret(
                State(state.clone()),
                Path("s3cret".to_string()),
                HeaderMap::new(),
                Json(update_body(42)),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Exactly one job despite two deliveries.
        let job = state.queue.dequeue(names::UPDATES).await.unwrap().unwrap();
        state.queue.ack(job.id).await.unwrap();
        assert!(state.queue.dequeue(names::UPDATES).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn webhook_rejects_bad_secret() {
        let (state, _dir) = state(Some("s3cret"), None).await;
        let response = handlers::post_webhook_with_secret(
            State(state),
            Path("wrong".to_string()),
            HeaderMap::new(),
            Json(update_body(1)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_accepts_header_secret() {
        let (state, _dir) = state(Some("s3cret"), None).await;
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Telegram-Bot-Api-Secret-Token",
            HeaderValue::from_static("s3cret"),
        );
        let response =
            handlers::post_webhook(State(state), headers, Json(update_body(2))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_requires_numeric_update_id() {
        let (state, _dir) = state(None, None).await;
        let response = handlers::post_webhook(
            State(state),
            HeaderMap::new(),
            Json(json!({"message": {"text": "hi"}})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn readyz_reports_ready_with_queue_depth() {
        let (state, _dir) = state(None, None).await;
        let response = handlers::get_readyz(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn replay_requires_bearer_token() {
        let (state, _dir) = state(None, Some("admin-tok")).await;

        let response = handlers::post_replay_update(
            State(state.clone()),
            HeaderMap::new(),
            Json(handlers::ReplayRequest { update_id: 42 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn replay_enqueues_a_stored_update_with_fresh_job_id() {
        let (state, _dir) = state(None, Some("admin-tok")).await;

        // A fully processed update awaiting replay.
        state.ingestor.ingest(42, &update_body(42).to_string()).await.unwrap();
        let original = state.queue.dequeue(names::UPDATES).await.unwrap().unwrap();
        state.queue.ack(original.id).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer admin-tok"));
        let response = handlers::post_replay_update(
            State(state.clone()),
            headers,
            Json(handlers::ReplayRequest { update_id: 42 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let replayed = state.queue.dequeue(names::UPDATES).await.unwrap().unwrap();
        assert!(replayed.job_id.starts_with("replay-42-"));
    }

    #[tokio::test]
    async fn replay_404s_on_unknown_update() {
        let (state, _dir) = state(None, Some("admin-tok")).await;
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer admin-tok"));
        let response = handlers::post_replay_update(
            State(state),
            headers,
            Json(handlers::ReplayRequest { update_id: 999 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
