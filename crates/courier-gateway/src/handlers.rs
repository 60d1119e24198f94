// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! The webhook follows persist-then-ack: a durable insert is enough to
//! return 200, enqueue failures are the recovery sweep's problem.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::server::GatewayState;
use courier_storage::queries::updates;

/// Telegram's webhook authentication header.
const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn secret_matches(state: &GatewayState, headers: &HeaderMap, path_secret: Option<&str>) -> bool {
    let Some(expected) = &state.webhook_secret else {
        // No secret configured: accept (polling-mode deployments keep
        // the route unregistered with the platform anyway).
        return true;
    };
    if path_secret == Some(expected.as_str()) {
        return true;
    }
    headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

async fn handle_webhook(
    state: &GatewayState,
    headers: &HeaderMap,
    path_secret: Option<&str>,
    body: Value,
) -> Response {
    if !secret_matches(state, headers, path_secret) {
        return error_response(StatusCode::UNAUTHORIZED, "bad webhook secret");
    }

    let Some(update_id) = body.get("update_id").and_then(Value::as_i64) else {
        return error_response(StatusCode::BAD_REQUEST, "missing numeric update_id");
    };

    match state.ingestor.ingest(update_id, &body.to_string()).await {
        Ok(outcome) => {
            debug!(update_id, ?outcome, "webhook update ingested");
            Json(WebhookResponse {
                ok: true,
                duplicate: outcome.is_duplicate(),
            })
            .into_response()
        }
        Err(e) => {
            warn!(update_id, error = %e, "webhook ingest failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "ingest failed")
        }
    }
}

/// POST /telegram/webhook/{secret}
pub async fn post_webhook_with_secret(
    State(state): State<GatewayState>,
    Path(secret): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    handle_webhook(&state, &headers, Some(&secret), body).await
}

/// POST /telegram/webhook (header-authenticated)
pub async fn post_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    handle_webhook(&state, &headers, None, body).await
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /healthz: process liveness only.
pub async fn get_healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub queue_depth: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /readyz: relational store, KV store, and queue depth.
pub async fn get_readyz(State(state): State<GatewayState>) -> Response {
    let not_ready = |error: String| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "unavailable",
                queue_depth: -1,
                error: Some(error),
            }),
        )
            .into_response()
    };

    if let Err(e) = state.db.ping().await {
        return not_ready(format!("database: {e}"));
    }
    if let Err(e) = state.kv.ping().await {
        return not_ready(format!("kv: {e}"));
    }
    match state.queue.depth().await {
        Ok(queue_depth) => Json(ReadyResponse {
            status: "ready",
            queue_depth,
            error: None,
        })
        .into_response(),
        Err(e) => not_ready(format!("queue: {e}")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplayRequest {
    pub update_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub ok: bool,
    pub job_id: String,
}

/// POST /internal/replay-update: bearer-token protected manual replay.
pub async fn post_replay_update(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<ReplayRequest>,
) -> Response {
    let Some(expected) = &state.admin_token else {
        return error_response(StatusCode::NOT_FOUND, "replay disabled");
    };
    let bearer = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if bearer != Some(expected.as_str()) {
        return error_response(StatusCode::UNAUTHORIZED, "bad admin token");
    }

    let stored = match updates::get_update(&state.db, body.update_id).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "unknown update_id"),
        Err(e) => {
            warn!(update_id = body.update_id, error = %e, "replay lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "lookup failed");
        }
    };

    // A fresh job id: replays must bypass the original dedup key.
    let job_id = format!(
        "replay-{}-{}",
        body.update_id,
        uuid::Uuid::new_v4().simple()
    );
    let enqueue = state
        .queue
        .enqueue(courier_queue::EnqueueRequest::new(
            courier_queue::names::UPDATES,
            job_id.clone(),
            stored.payload,
        ))
        .await;
    match enqueue {
        Ok(_) => Json(ReplayResponse { ok: true, job_id }).into_response(),
        Err(e) => {
            warn!(update_id = body.update_id, error = %e, "replay enqueue failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "enqueue failed")
        }
    }
}
