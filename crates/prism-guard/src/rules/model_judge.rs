// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Delegates the verdict to an injected [`Judge`].  The rule owns only the
//! plumbing: content filtering, refusal/error verdict mapping, and an
//! optional confidence threshold over the judge's evidence.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::RuleConfig;
use crate::error::GuardError;
use crate::rule::{decode_params, Judge, JudgeError, Rule, RuleDeps};
use crate::types::{ContentType, Input, RuleResult, Scope, Verdict};

pub const RULE_TYPE: &str = "model_judge";

#[derive(Debug, Deserialize)]
struct Params {
    model: String,
    prompt: String,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    targets: Vec<ContentType>,
    #[serde(default = "default_review")]
    verdict_on_refuse: Verdict,
    #[serde(default = "default_review")]
    verdict_on_error: Verdict,
}

fn default_review() -> Verdict {
    Verdict::Review
}

pub struct ModelJudgeRule {
    id: String,
    name: String,
    scope: Scope,
    model: String,
    prompt: String,
    threshold: Option<f64>,
    targets: Vec<ContentType>,
    verdict_on_refuse: Verdict,
    verdict_on_error: Verdict,
    judge: Option<Arc<dyn Judge>>,
}

/// Factory registered under [`RULE_TYPE`].
pub fn build(cfg: &RuleConfig, deps: &RuleDeps) -> Result<Arc<dyn Rule>, GuardError> {
    let params: Params = decode_params(cfg)?;
    if params.model.is_empty() {
        return Err(GuardError::Config(format!("rule {}: model must not be empty", cfg.id)));
    }
    Ok(Arc::new(ModelJudgeRule {
        id: cfg.id.clone(),
        name: cfg.name.clone(),
        scope: cfg.scope.clone(),
        model: params.model,
        prompt: params.prompt,
        threshold: params.threshold,
        targets: params.targets,
        verdict_on_refuse: params.verdict_on_refuse,
        verdict_on_error: params.verdict_on_error,
        judge: deps.judge.clone(),
    }))
}

impl ModelJudgeRule {
    fn result(&self, verdict: Verdict, reason: String, evidence: serde_json::Map<String, serde_json::Value>) -> RuleResult {
        RuleResult {
            rule_id: self.id.clone(),
            rule_name: self.name.clone(),
            rule_type: RULE_TYPE.into(),
            verdict,
            reason,
            evidence,
        }
    }
}

#[async_trait]
impl Rule for ModelJudgeRule {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn rule_type(&self) -> &str {
        RULE_TYPE
    }
    fn scope(&self) -> &Scope {
        &self.scope
    }

    async fn evaluate(&self, input: &Input) -> Result<RuleResult, GuardError> {
        let judge = self.judge.as_ref().ok_or_else(|| {
            GuardError::JudgeUnavailable(format!("rule {} has no judge configured", self.id))
        })?;

        // Only the selected content views reach the judge.
        let mut judged = input.clone();
        judged.content = input.content.filter(&self.targets);

        match judge.judge(&self.model, &self.prompt, &judged).await {
            Ok(decision) => {
                // Below the confidence threshold the judgement is ignored.
                if let (Some(threshold), Some(score)) = (
                    self.threshold,
                    decision.evidence.get("score").and_then(|v| v.as_f64()),
                ) {
                    if score < threshold {
                        debug!(rule = %self.id, score, threshold, "judge score below threshold");
                        return Ok(self.result(Verdict::Allow, String::new(), decision.evidence));
                    }
                }
                Ok(self.result(decision.verdict, decision.reason, decision.evidence))
            }
            Err(JudgeError::Refused(reason)) => Ok(self.result(
                self.verdict_on_refuse,
                format!("judge refused: {reason}"),
                Default::default(),
            )),
            Err(e) => Ok(self.result(
                self.verdict_on_error,
                format!("judge error: {e}"),
                Default::default(),
            )),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
