// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end test harness.
//!
//! Assembles the full pipeline (ingestion, routing, rate limiting,
//! approvals, turn execution) over a temp SQLite database, the in-
//! process KV store, mock transport, mock provider, and mock tools.
//! `deliver_*` methods push platform-shaped updates through the same
//! path the webhook uses; `drain()` plays the queue workers inline.

use std::sync::Arc;

use courier_agent::{TurnExecutor, TurnJobHandler};
use courier_approval::workers::{CountdownJobHandler, ExpiryJobHandler};
use courier_approval::ApprovalEngine;
use courier_audit::AuditLog;
use courier_config::LimitsConfig;
use courier_core::traits::chat::NoopDraftFactory;
use courier_core::traits::tool::Tool;
use courier_core::CourierError;
use courier_ingest::{IngestOutcome, Ingestor};
use courier_kv::MemoryKv;
use courier_lock::ChatLockManager;
use courier_queue::{names, JobHandler, JobQueue};
use courier_ratelimit::RateLimiter;
use courier_router::{Router, RouterConfig, UpdateJobHandler};
use courier_storage::Database;
use serde_json::{json, Value};

use crate::mock_provider::MockProvider;
use crate::mock_tools::{BalanceTool, SendTool};
use crate::mock_transport::MockTransport;

/// Builder for the harness.
pub struct TestHarnessBuilder {
    limits: LimitsConfig,
    with_fallback: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            // Generous defaults so rate limits only bite when a test
            // tightens them.
            limits: LimitsConfig {
                free_burst_max: 1000,
                free_minute_max: 10_000,
                free_daily_max: 100_000,
                chat_minute_max: 10_000,
                ..LimitsConfig::default()
            },
            with_fallback: false,
        }
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_fallback_provider(mut self) -> Self {
        self.with_fallback = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let dir = tempfile::tempdir().map_err(|e| CourierError::Storage {
            source: Box::new(e),
        })?;
        let db_path = dir.path().join("harness.db");
        let db = Database::open(&db_path.to_string_lossy()).await?;

        let kv = Arc::new(MemoryKv::new());
        let queue = JobQueue::new(db.clone());
        let audit = AuditLog::new(db.clone());
        let engine = ApprovalEngine::new(db.clone(), kv.clone(), queue.clone(), audit.clone());
        let limiter = Arc::new(RateLimiter::new(kv.clone(), self.limits));
        let locks = ChatLockManager::new(kv.clone())
            .with_retry(5, std::time::Duration::from_millis(20));

        let transport = Arc::new(MockTransport::new());
        let provider = Arc::new(MockProvider::new("mock:primary"));
        let fallback = self
            .with_fallback
            .then(|| Arc::new(MockProvider::new("mock:fallback")));

        let balance_tool = Arc::new(BalanceTool::default());
        let send_tool = Arc::new(SendTool::default());
        let tools: Vec<Arc<dyn Tool>> = vec![balance_tool.clone(), send_tool.clone()];

        let executor = Arc::new(TurnExecutor::new(
            db.clone(),
            audit.clone(),
            engine.clone(),
            locks,
            provider.clone(),
            fallback
                .clone()
                .map(|p| p as Arc<dyn courier_core::traits::provider::ModelProvider>),
            tools,
            "courier".to_string(),
            4096,
        ));

        let router = Arc::new(Router::new(
            db.clone(),
            queue.clone(),
            limiter,
            engine.clone(),
            RouterConfig {
                model: "claude-sonnet-4-20250514".into(),
                default_network: "mainnet".into(),
                topic_auto_create: false,
            },
            None,
        ));

        let update_handler =
            UpdateJobHandler::new(db.clone(), router.clone(), transport.clone());
        let turn_handler = TurnJobHandler::new(
            executor,
            engine.clone(),
            transport.clone(),
            Arc::new(NoopDraftFactory),
        );

        Ok(TestHarness {
            ingestor: Ingestor::new(db.clone(), queue.clone()),
            db,
            kv,
            queue,
            audit,
            engine,
            transport,
            provider,
            fallback,
            balance_tool,
            send_tool,
            update_handler,
            turn_handler,
            _dir: dir,
        })
    }
}

/// A fully wired runtime over mocks.
pub struct TestHarness {
    pub db: Database,
    pub kv: Arc<MemoryKv>,
    pub queue: JobQueue,
    pub audit: AuditLog,
    pub engine: ApprovalEngine,
    pub ingestor: Ingestor,
    pub transport: Arc<MockTransport>,
    pub provider: Arc<MockProvider>,
    pub fallback: Option<Arc<MockProvider>>,
    pub balance_tool: Arc<BalanceTool>,
    pub send_tool: Arc<SendTool>,
    update_handler: UpdateJobHandler,
    turn_handler: TurnJobHandler,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Push a raw platform update through the ingestion contract.
    pub async fn deliver_update(&self, payload: Value) -> Result<IngestOutcome, CourierError> {
        let update_id = payload
            .get("update_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| CourierError::Validation("fixture missing update_id".into()))?;
        self.ingestor.ingest(update_id, &payload.to_string()).await
    }

    /// Platform-shaped text message fixture.
    pub fn text_update(update_id: i64, chat_id: i64, user_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "date": 1700000000i64,
                "chat": {"id": chat_id, "type": "private", "first_name": "Test"},
                "from": {"id": user_id, "is_bot": false, "first_name": "Test"},
                "text": text,
            }
        })
    }

    /// Platform-shaped callback fixture.
    pub fn callback_update(
        update_id: i64,
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        data: &str,
    ) -> Value {
        json!({
            "update_id": update_id,
            "callback_query": {
                "id": format!("cbq-{update_id}"),
                "from": {"id": user_id, "is_bot": false, "first_name": "Test"},
                "message": {
                    "message_id": message_id,
                    "chat": {"id": chat_id, "type": "private"},
                },
                "data": data,
            }
        })
    }

    /// Deliver a text message and drain the pipeline.
    pub async fn send_text(
        &self,
        update_id: i64,
        chat_id: i64,
        user_id: i64,
        text: &str,
    ) -> Result<IngestOutcome, CourierError> {
        let outcome = self
            .deliver_update(Self::text_update(update_id, chat_id, user_id, text))
            .await?;
        self.drain().await?;
        Ok(outcome)
    }

    /// Deliver a button tap and drain the pipeline.
    pub async fn tap(
        &self,
        update_id: i64,
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        data: &str,
    ) -> Result<(), CourierError> {
        self.deliver_update(Self::callback_update(
            update_id, chat_id, user_id, message_id, data,
        ))
        .await?;
        self.drain().await
    }

    /// Play the update and turn workers inline until both queues idle.
    pub async fn drain(&self) -> Result<(), CourierError> {
        loop {
            let mut progressed = false;
            while let Some(job) = self.queue.dequeue(names::UPDATES).await? {
                progressed = true;
                match self.update_handler.handle(&job).await {
                    Ok(()) => self.queue.ack(job.id).await?,
                    Err(e) => {
                        self.queue.fail(job.id, &e.to_string()).await?;
                    }
                }
            }
            while let Some(job) = self.queue.dequeue(names::AGENT_TURNS).await? {
                progressed = true;
                match self.turn_handler.handle(&job).await {
                    Ok(()) => self.queue.ack(job.id).await?,
                    Err(e) => {
                        self.queue.fail(job.id, &e.to_string()).await?;
                    }
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Fire due approval lifecycle jobs (expiry, countdown) once.
    pub async fn run_approval_jobs(&self) -> Result<(), CourierError> {
        let expiry = ExpiryJobHandler::new(self.engine.clone(), self.transport.clone());
        let countdown = CountdownJobHandler::new(self.engine.clone(), self.transport.clone());

        while let Some(job) = self.queue.dequeue(names::APPROVAL_TIMEOUTS).await? {
            match expiry.handle(&job).await {
                Ok(()) => self.queue.ack(job.id).await?,
                Err(e) => {
                    self.queue.fail(job.id, &e.to_string()).await?;
                }
            }
        }
        while let Some(job) = self.queue.dequeue(names::APPROVAL_COUNTDOWNS).await? {
            match countdown.handle(&job).await {
                Ok(()) => self.queue.ack(job.id).await?,
                Err(e) => {
                    self.queue.fail(job.id, &e.to_string()).await?;
                }
            }
        }
        Ok(())
    }

    /// Test clock control: make every delayed job deliverable now.
    pub async fn make_jobs_due(&self) -> Result<(), CourierError> {
        self.db
            .connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE jobs SET run_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-1 second')
                     WHERE status = 'pending'",
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| CourierError::Storage {
                source: Box::new(e),
            })
    }

    /// Test clock control: push every pending approval past its TTL.
    pub async fn expire_approvals_now(&self) -> Result<(), CourierError> {
        self.db
            .connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE approvals
                     SET expires_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-1 second')
                     WHERE status = 'requested'",
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| CourierError::Storage {
                source: Box::new(e),
            })
    }

    /// The callback token of the most recently presented approval card.
    pub fn last_approval_token(&self) -> Option<String> {
        let card = self.transport.last_keyboard_message()?;
        let keyboard = card.keyboard?;
        let data = &keyboard.rows.first()?.first()?.callback_data;
        // "ap:<token>:approve"
        let mut parts = data.splitn(3, ':');
        let _namespace = parts.next()?;
        parts.next().map(str::to_string)
    }
}
