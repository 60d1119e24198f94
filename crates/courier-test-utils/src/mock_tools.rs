// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock tools: one read-only lookup and one value-moving write.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use courier_core::traits::tool::{Tool, ToolContext};
use courier_core::CourierError;
use serde_json::{json, Value};

/// Read-only balance lookup.
#[derive(Default)]
pub struct BalanceTool {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Tool for BalanceTool {
    fn name(&self) -> &str {
        "getBalance"
    }

    fn description(&self) -> &str {
        "Read the balance of an address"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"address": {"type": "string"}},
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, CourierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "address": input.get("address").cloned().unwrap_or(Value::Null),
            "balance": 12.4,
        }))
    }
}

/// Value-moving transfer; gated behind approval by the policy wrap.
#[derive(Default)]
pub struct SendTool {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Tool for SendTool {
    fn name(&self) -> &str {
        "sendMessage"
    }

    fn description(&self) -> &str {
        "Send value to a destination address"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": {"type": "string"},
                "amount": {"type": "number"},
            },
            "required": ["to", "amount"],
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, CourierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "status": "sent",
            "to": input.get("to").cloned().unwrap_or(Value::Null),
            "amount": input.get("amount").cloned().unwrap_or(Value::Null),
            "hash": "b16fa0c3",
        }))
    }
}
