// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use courier_core::traits::kv::KvStore;
use courier_core::CourierError;
use courier_ingest::Ingestor;
use courier_queue::JobQueue;
use courier_storage::Database;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub ingestor: Ingestor,
    pub db: Database,
    pub kv: Arc<dyn KvStore>,
    pub queue: JobQueue,
    /// Webhook secret; `None` accepts unauthenticated posts (polling
    /// deployments never register the route with the platform).
    pub webhook_secret: Option<String>,
    /// Bearer token for internal endpoints; `None` disables them.
    pub admin_token: Option<String>,
}

/// Gateway bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the route table.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::get_healthz))
        .route("/readyz", get(handlers::get_readyz))
        .route("/telegram/webhook", post(handlers::post_webhook))
        .route(
            "/telegram/webhook/{secret}",
            post(handlers::post_webhook_with_secret),
        )
        .route("/internal/replay-update", post(handlers::post_replay_update))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the cancellation token fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), CourierError> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CourierError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| CourierError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;
    Ok(())
}
