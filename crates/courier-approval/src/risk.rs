// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Risk assessment for sensitive tool calls.
//!
//! A pure function over `(tool_name, tool_input, risk_profile)`:
//! base risk from the tool class, a heuristic numeric walk over the input
//! for value and gas estimates, then profile / batch / value adjustments.

use courier_core::types::{RiskConfidence, RiskLevel, RiskProfile};
use serde_json::Value;

/// Key-name hints for value extraction.
const VALUE_HINTS: &[&str] = &["amount", "value", "ton", "coins", "send"];
/// Key-name hints for gas/fee extraction.
const GAS_HINTS: &[&str] = &["gas", "fee", "fwd_fee", "storage_fee"];
/// Array length at which a batch is treated as critical.
const BATCH_CRITICAL_LEN: usize = 5;

/// The outcome of a risk assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub confidence: RiskConfidence,
    pub value_estimate: Option<f64>,
    pub gas_estimate: Option<f64>,
}

/// Assess a tool call. Pure: no I/O, no clock.
pub fn assess(tool_name: &str, input: &Value, profile: RiskProfile) -> RiskAssessment {
    let mut level = base_level(tool_name);

    let mut walk = NumericWalk::default();
    walk.visit(input);

    // Profile adjustment first, then structural escalations.
    level = match profile {
        RiskProfile::Cautious => level.bumped(),
        RiskProfile::Advanced => level.lowered(),
        RiskProfile::Balanced => level,
    };

    if walk.max_array_len >= BATCH_CRITICAL_LEN {
        level = RiskLevel::Critical;
    }

    if let Some(value) = walk.value {
        if value >= 100.0 {
            level = RiskLevel::Critical;
        } else if value >= 10.0 {
            level = level.max(RiskLevel::High);
        } else if value >= 1.0 {
            level = level.max(RiskLevel::Medium);
        }
    }

    let confidence = match (walk.value.is_some(), walk.gas.is_some()) {
        (true, true) => RiskConfidence::High,
        (true, false) | (false, true) => RiskConfidence::Medium,
        (false, false) => RiskConfidence::Low,
    };

    RiskAssessment {
        level,
        confidence,
        value_estimate: walk.value,
        gas_estimate: walk.gas,
    }
}

/// Base risk by tool class, from the tool name.
fn base_level(tool_name: &str) -> RiskLevel {
    let name = tool_name.to_ascii_lowercase();
    let writes = name.contains("send")
        || name.contains("transfer")
        || name.contains("write")
        || name.contains("swap")
        || name.contains("burn")
        || name.contains("mint");
    if name.contains("batch") && writes {
        RiskLevel::Critical
    } else if writes {
        RiskLevel::High
    } else if name.contains("proof") {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[derive(Debug, Default)]
struct NumericWalk {
    value: Option<f64>,
    gas: Option<f64>,
    max_array_len: usize,
}

impl NumericWalk {
    fn visit(&mut self, node: &Value) {
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    self.visit_keyed(key, child);
                    self.visit(child);
                }
            }
            Value::Array(items) => {
                self.max_array_len = self.max_array_len.max(items.len());
                for item in items {
                    self.visit(item);
                }
            }
            _ => {}
        }
    }

    fn visit_keyed(&mut self, key: &str, child: &Value) {
        let Some(mut number) = as_number(child) else {
            return;
        };
        let key = key.to_ascii_lowercase();
        // Nano-denominated keys carry base units; scale to whole units.
        if key.contains("nano") {
            number /= 1e9;
        }
        if VALUE_HINTS.iter().any(|hint| key.contains(hint)) {
            *self.value.get_or_insert(0.0) += number;
        } else if GAS_HINTS.iter().any(|hint| key.contains(hint)) {
            *self.gas.get_or_insert(0.0) += number;
        }
    }
}

/// Numbers and numeric strings both count; anything else is skipped.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
