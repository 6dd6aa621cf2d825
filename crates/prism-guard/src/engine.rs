// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rule::Rule;
use crate::types::{CombineStrategy, ErrorStrategy, Input, RuleResult, Verdict};

/// One rule failure captured during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleError {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: String,
    pub error: String,
}

/// Outcome of evaluating one input against the whole rule set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// Non-allow rule results, in evaluation order.
    pub reasons: Vec<RuleResult>,
    pub errors: Vec<RuleError>,
}

impl Evaluation {
    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }
}

pub struct GuardEngine {
    combine: CombineStrategy,
    error_strategy: ErrorStrategy,
    short_circuit: bool,
    rules: Vec<Arc<dyn Rule>>,
}

impl std::fmt::Debug for GuardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardEngine")
            .field("combine", &self.combine)
            .field("error_strategy", &self.error_strategy)
            .field("short_circuit", &self.short_circuit)
            .field("rule_count", &self.rules.len())
            .finish()
    }
}

impl GuardEngine {
    pub fn new(
        combine: CombineStrategy,
        error_strategy: ErrorStrategy,
        short_circuit: bool,
        rules: Vec<Arc<dyn Rule>>,
    ) -> Self {
        Self { combine, error_strategy, short_circuit, rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate every in-scope rule in declared order.
    ///
    /// Rule errors are captured, never raised: the configured error strategy
    /// supplies the verdict merged in their place.  With `short_circuit`,
    /// evaluation stops as soon as the aggregate reaches `block`.
    pub async fn evaluate(&self, input: &Input) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let mut blocked_pinned = false;

        for rule in &self.rules {
            if !rule.scope().matches(input) {
                continue;
            }
            match rule.evaluate(input).await {
                Ok(result) => {
                    debug!(
                        rule = rule.id(),
                        verdict = result.verdict.as_str(),
                        "rule evaluated"
                    );
                    if result.verdict != Verdict::Allow {
                        self.merge(&mut evaluation.verdict, result.verdict, &mut blocked_pinned);
                        evaluation.reasons.push(result);
                    }
                }
                Err(e) => {
                    warn!(rule = rule.id(), error = %e, "rule evaluation failed");
                    evaluation.errors.push(RuleError {
                        rule_id: rule.id().to_string(),
                        rule_name: rule.name().to_string(),
                        rule_type: rule.rule_type().to_string(),
                        error: e.to_string(),
                    });
                    self.merge(
                        &mut evaluation.verdict,
                        self.error_strategy.verdict(),
                        &mut blocked_pinned,
                    );
                }
            }
            if self.short_circuit && evaluation.verdict == Verdict::Block {
                break;
            }
        }
        evaluation
    }

    fn merge(&self, aggregate: &mut Verdict, incoming: Verdict, blocked_pinned: &mut bool) {
        match self.combine {
            CombineStrategy::MostSevere => *aggregate = aggregate.max(incoming),
            CombineStrategy::BlockOnAny => {
                if *blocked_pinned {
                    return;
                }
                if incoming == Verdict::Block {
                    *aggregate = Verdict::Block;
                    *blocked_pinned = true;
                } else {
                    *aggregate = aggregate.max(incoming);
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
