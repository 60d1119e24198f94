// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` implementation.
//!
//! Wires the whole runtime: storage, KV, queue workers, the recovery
//! sweep, the HTTP gateway, and the transport's update feed. Shutdown is
//! cooperative: SIGINT/SIGTERM cancels the shared token, workers stop
//! dequeuing and drain in-flight jobs, pending approvals survive via
//! their persisted expiry.

use std::sync::Arc;

use courier_agent::{TurnExecutor, TurnJobHandler};
use courier_anthropic::{AnthropicClient, AnthropicProvider};
use courier_approval::{ApprovalEngine, CountdownJobHandler, ExpiryJobHandler};
use courier_audit::AuditLog;
use courier_config::{CourierConfig, RunMode};
use courier_core::traits::chat::{ChatTransport, DraftSinkFactory, NoopDraftFactory};
use courier_core::traits::provider::ModelProvider;
use courier_core::traits::tool::Tool;
use courier_core::CourierError;
use courier_gateway::{GatewayState, ServerConfig};
use courier_ingest::Ingestor;
use courier_kv::MemoryKv;
use courier_lock::ChatLockManager;
use courier_queue::{names, JobQueue, JobWorker};
use courier_ratelimit::RateLimiter;
use courier_router::{Router, RouterConfig, UpdateJobHandler};
use courier_storage::Database;
use courier_telegram::{TelegramDraftFactory, TelegramTransport};
use teloxide::Bot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber from the configured log level.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},info")));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run the `courier serve` command.
pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    init_tracing(&config.agent.log_level);

    if let Err(problems) = courier_config::validate(&config) {
        for problem in &problems {
            error!("config: {problem}");
        }
        return Err(CourierError::Config(problems.join("; ")));
    }

    info!(name = config.agent.name.as_str(), "starting courier serve");

    // Storage and shared stores.
    let db = Database::open(&config.storage.database_path).await?;

    // 30-day retention on settled updates.
    let purged = courier_storage::queries::updates::purge_older_than(&db, 30).await?;
    if purged > 0 {
        info!(purged, "purged settled updates past retention");
    }

    let kv = Arc::new(MemoryKv::new());
    let queue = JobQueue::new(db.clone());
    let audit = AuditLog::new(db.clone());
    let engine = ApprovalEngine::new(db.clone(), kv.clone(), queue.clone(), audit.clone());
    let limiter = Arc::new(RateLimiter::new(kv.clone(), config.limits.clone()));
    let locks = ChatLockManager::new(kv.clone());

    // Transport.
    let bot_token = config
        .transport
        .bot_token
        .clone()
        .ok_or_else(|| CourierError::Config("transport.bot_token is required for serve".into()))?;
    let bot = Bot::new(bot_token);
    let telegram = TelegramTransport::new(bot.clone());
    let transport: Arc<dyn ChatTransport> = Arc::new(telegram);

    // Model providers.
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| CourierError::Config("ANTHROPIC_API_KEY is not set".into()))?;
    let client = Arc::new(AnthropicClient::new(api_key, "2023-06-01".to_string())?);
    let primary: Arc<dyn ModelProvider> =
        Arc::new(AnthropicProvider::new(client.clone(), "anthropic:primary"));
    let fallback: Option<Arc<dyn ModelProvider>> = config.models.fallback.clone().map(|model| {
        Arc::new(AnthropicProvider::new(client.clone(), "anthropic:fallback").with_model(model))
            as Arc<dyn ModelProvider>
    });

    // The domain tool catalog is supplied by the embedding deployment;
    // the bare runtime starts with none and still serves conversation.
    let tools: Vec<Arc<dyn Tool>> = Vec::new();

    let executor = Arc::new(TurnExecutor::new(
        db.clone(),
        audit.clone(),
        engine.clone(),
        locks,
        primary,
        fallback,
        tools,
        config.agent.name.clone(),
        config.models.max_tokens,
    ));

    let router = Arc::new(Router::new(
        db.clone(),
        queue.clone(),
        limiter,
        engine.clone(),
        RouterConfig {
            model: config.models.primary.clone(),
            default_network: config.agent.default_network.clone(),
            topic_auto_create: config.features.topic_auto_create,
        },
        config.features.topic_auto_create.then(|| transport.clone()),
    ));

    let drafts: Arc<dyn DraftSinkFactory> = if config.features.streaming_drafts {
        Arc::new(TelegramDraftFactory::new(bot.clone()))
    } else {
        Arc::new(NoopDraftFactory)
    };

    let ingestor = Ingestor::new(db.clone(), queue.clone());
    let cancel = CancellationToken::new();

    // Queue workers.
    let mut tasks = Vec::new();
    tasks.push(
        JobWorker::new(
            queue.clone(),
            names::UPDATES,
            Arc::new(UpdateJobHandler::new(
                db.clone(),
                router.clone(),
                transport.clone(),
            )),
        )
        .spawn(cancel.clone()),
    );
    tasks.push(
        JobWorker::new(
            queue.clone(),
            names::AGENT_TURNS,
            Arc::new(TurnJobHandler::new(
                executor,
                engine.clone(),
                transport.clone(),
                drafts,
            )),
        )
        .spawn(cancel.clone()),
    );
    tasks.push(
        JobWorker::new(
            queue.clone(),
            names::APPROVAL_TIMEOUTS,
            Arc::new(ExpiryJobHandler::new(engine.clone(), transport.clone())),
        )
        .spawn(cancel.clone()),
    );
    tasks.push(
        JobWorker::new(
            queue.clone(),
            names::APPROVAL_COUNTDOWNS,
            Arc::new(CountdownJobHandler::new(engine.clone(), transport.clone())),
        )
        .spawn(cancel.clone()),
    );

    // Recovery sweep: no persisted update is ever lost to a queue outage.
    tasks.push(ingestor.clone().spawn_recovery_sweep(cancel.clone()));

    // HTTP gateway (webhook intake, health probes, replay).
    let gateway_state = GatewayState {
        ingestor: ingestor.clone(),
        db: db.clone(),
        kv: kv.clone(),
        queue: queue.clone(),
        webhook_secret: config.transport.webhook_secret.clone(),
        admin_token: config.transport.admin_token.clone(),
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };
    {
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = courier_gateway::start_server(&server_config, gateway_state, cancel).await
            {
                error!(error = %e, "gateway server exited");
            }
        }));
    }

    // Update feed.
    if config.transport.run_mode == RunMode::Polling {
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(courier_telegram::run_polling(
            bot, ingestor, cancel,
        )));
    } else {
        info!("webhook mode: updates arrive via the gateway");
    }

    info!("courier is up");
    shutdown_signal().await;
    info!("shutdown signal received, draining");
    cancel.cancel();

    for task in tasks {
        let _ = task.await;
    }
    db.close().await?;
    info!("courier stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
