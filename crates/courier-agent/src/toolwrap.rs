// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool policy wrapping.
//!
//! Before the catalog reaches the model it is filtered and decorated:
//! secrets-handling tools are dropped outright, non-private chats lose
//! every non-read-only tool, execution gets a 20-second timeout, and
//! read-only results are cached for 30 seconds keyed by canonical input.
//! Approval marking composes the tool's own opinion with a risk
//! classification and an input-size gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_approval::risk;
use courier_audit::canonical_string;
use courier_core::traits::tool::{Tool, ToolContext};
use courier_core::types::{RiskLevel, RiskProfile};
use courier_core::CourierError;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

/// Hard cap on a single tool execution.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(20);
/// Read-only result cache TTL.
pub const CACHE_TTL: Duration = Duration::from_secs(30);
/// Input size at which compute-heavy calls force approval.
pub const APPROVAL_SIZE_THRESHOLD: usize = 6_000;

/// Chat-dependent policy inputs.
#[derive(Debug, Clone, Copy)]
pub struct ToolPolicy {
    /// Private chats get the full catalog; shared chats read-only only.
    pub private_chat: bool,
}

/// Tools that touch key material or signing never reach the model.
fn is_secrets_tool(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.contains("sign")
        || name.contains("mnemonic")
        || name.contains("secret")
        || (name.contains("key") && (name.contains("generate") || name.contains("create") || name.contains("export")))
}

/// Filter and wrap a raw catalog under the policy.
pub fn policy_catalog(tools: &[Arc<dyn Tool>], policy: ToolPolicy) -> Vec<Arc<dyn Tool>> {
    tools
        .iter()
        .filter(|tool| !is_secrets_tool(tool.name()))
        .filter(|tool| policy.private_chat || tool.read_only())
        .map(|tool| Arc::new(PolicyTool::new(tool.clone())) as Arc<dyn Tool>)
        .collect()
}

type CacheEntry = (Instant, Value);

/// Decorates one tool with timeout, caching, and approval marking.
pub struct PolicyTool {
    inner: Arc<dyn Tool>,
    cache: DashMap<String, CacheEntry>,
}

impl PolicyTool {
    pub fn new(inner: Arc<dyn Tool>) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    fn cache_key(&self, input: &Value) -> String {
        format!("{}:{}", self.inner.name(), canonical_string(input))
    }
}

#[async_trait]
impl Tool for PolicyTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn input_schema(&self) -> Value {
        self.inner.input_schema()
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }

    fn needs_approval(&self, input: &Value) -> bool {
        if self.inner.needs_approval(input) {
            return true;
        }
        // Critical/high-risk writes always gate on the user.
        if !self.inner.read_only() {
            let assessment = risk::assess(self.inner.name(), input, RiskProfile::Balanced);
            if assessment.level >= RiskLevel::High {
                return true;
            }
        }
        // Oversized compute payloads gate regardless of class.
        input.to_string().len() >= APPROVAL_SIZE_THRESHOLD
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, CourierError> {
        let cacheable = self.inner.read_only();
        let key = if cacheable {
            let key = self.cache_key(&input);
            if let Some(entry) = self.cache.get(&key) {
                if entry.0.elapsed() < CACHE_TTL {
                    debug!(tool = self.inner.name(), "tool cache hit");
                    return Ok(entry.1.clone());
                }
            }
            Some(key)
        } else {
            None
        };

        let result = tokio::time::timeout(TOOL_TIMEOUT, self.inner.execute(input, ctx))
            .await
            .map_err(|_| CourierError::Timeout {
                duration: TOOL_TIMEOUT,
            })??;

        if let Some(key) = key {
            self.cache.insert(key, (Instant::now(), result.clone()));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::CorrelationId;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTool {
        name: &'static str,
        read_only: bool,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeTool {
        fn new(name: &'static str, read_only: bool) -> Self {
            Self {
                name,
                read_only,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn read_only(&self) -> bool {
            self.read_only
        }
        async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, CourierError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(json!({"echo": input, "call": n}))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            chat_id: 100,
            session_id: "s-1".into(),
            network: "mainnet".into(),
            wallet_address: None,
            correlation_id: CorrelationId("corr-1".into()),
        }
    }

    #[test]
    fn secrets_tools_are_dropped() {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(FakeTool::new("getBalance", true)),
            Arc::new(FakeTool::new("signRawPayload", false)),
            Arc::new(FakeTool::new("generateKeyPair", false)),
            Arc::new(FakeTool::new("sendMessage", false)),
        ];
        let catalog = policy_catalog(&tools, ToolPolicy { private_chat: true });
        let names: Vec<&str> = catalog.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["getBalance", "sendMessage"]);
    }

    #[test]
    fn shared_chats_keep_read_only_tools_only() {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(FakeTool::new("getBalance", true)),
            Arc::new(FakeTool::new("sendMessage", false)),
        ];
        let catalog = policy_catalog(&tools, ToolPolicy { private_chat: false });
        let names: Vec<&str> = catalog.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["getBalance"]);
    }

    #[test]
    fn write_tools_need_approval_read_tools_do_not() {
        let send = PolicyTool::new(Arc::new(FakeTool::new("sendMessage", false)));
        assert!(send.needs_approval(&json!({"amount": 1.0})));

        let read = PolicyTool::new(Arc::new(FakeTool::new("getBalance", true)));
        assert!(!read.needs_approval(&json!({})));
    }

    #[test]
    fn oversized_input_forces_approval() {
        let tool = PolicyTool::new(Arc::new(FakeTool::new("compileContract", false)));
        let small = json!({"source": "x"});
        assert!(!tool.needs_approval(&small));

        let big = json!({"source": "x".repeat(APPROVAL_SIZE_THRESHOLD)});
        assert!(tool.needs_approval(&big));
    }

    #[tokio::test]
    async fn read_only_results_are_cached() {
        let inner = Arc::new(FakeTool::new("getBalance", true));
        let tool = PolicyTool::new(inner.clone());

        let first = tool.execute(json!({"address": "EQabc"}), &ctx()).await.unwrap();
        let second = tool.execute(json!({"address": "EQabc"}), &ctx()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        // A different input misses the cache.
        tool.execute(json!({"address": "EQxyz"}), &ctx()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn write_tools_are_never_cached() {
        let inner = Arc::new(FakeTool::new("sendMessage", false));
        let tool = PolicyTool::new(inner.clone());

        tool.execute(json!({"amount": 1}), &ctx()).await.unwrap();
        tool.execute(json!({"amount": 1}), &ctx()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tools_hit_the_timeout() {
        let mut slow = FakeTool::new("getBalance", true);
        slow.delay = Duration::from_secs(60);
        let tool = PolicyTool::new(Arc::new(slow));

        // Paused clock: the runtime fast-forwards to the 20 s timeout.
        let result = tool.execute(json!({}), &ctx()).await;
        assert!(matches!(result, Err(CourierError::Timeout { .. })));
    }

    #[test]
    fn cache_key_is_input_order_independent() {
        let tool = PolicyTool::new(Arc::new(FakeTool::new("getBalance", true)));
        let a = tool.cache_key(&json!({"a": 1, "b": 2}));
        let b = tool.cache_key(&serde_json::from_str::<Value>(r#"{"b": 2, "a": 1}"#).unwrap());
        assert_eq!(a, b);
    }
}
