// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::RuleConfig;
use crate::error::GuardError;
use crate::types::{Input, RuleResult, Scope, Verdict};

/// One guardrail rule.  Evaluation must be side-effect free; the engine
/// decides how verdicts combine.
#[async_trait]
pub trait Rule: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn rule_type(&self) -> &str;
    fn scope(&self) -> &Scope;
    async fn evaluate(&self, input: &Input) -> Result<RuleResult, GuardError>;
}

impl std::fmt::Debug for dyn Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("rule_type", &self.rule_type())
            .finish()
    }
}

// ── Judge dependency ──────────────────────────────────────────────────────────

/// Why a judge could not deliver a verdict.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The judge declined to evaluate this input.
    #[error("judge refused: {0}")]
    Refused(String),
    #[error("judge unavailable: {0}")]
    Unavailable(String),
    #[error("judge failed: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Default)]
pub struct JudgeDecision {
    /// Empty (default) verdict normalizes to allow.
    pub verdict: Verdict,
    pub reason: String,
    pub evidence: serde_json::Map<String, Value>,
}

/// External component that produces a verdict for an input.  Injected at
/// engine build time so rules never couple to a concrete LLM client.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(
        &self,
        model: &str,
        prompt: &str,
        input: &Input,
    ) -> Result<JudgeDecision, JudgeError>;
}

/// Dependencies handed to rule factories at build time.
#[derive(Clone, Default)]
pub struct RuleDeps {
    pub judge: Option<Arc<dyn Judge>>,
}

// ── Registry ──────────────────────────────────────────────────────────────────

pub type RuleFactory = fn(&RuleConfig, &RuleDeps) -> Result<Arc<dyn Rule>, GuardError>;

/// Factory map keyed by rule-type tag.  Write-once at startup; unknown
/// types fail at build time, never at evaluate time.
pub struct RuleRegistry {
    factories: HashMap<String, RuleFactory>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Registry with the built-in rule types registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(crate::rules::text_match::RULE_TYPE, crate::rules::text_match::build);
        registry.register(crate::rules::model_judge::RULE_TYPE, crate::rules::model_judge::build);
        registry
    }

    pub fn register(&mut self, rule_type: impl Into<String>, factory: RuleFactory) {
        self.factories.insert(rule_type.into(), factory);
    }

    pub fn build(&self, cfg: &RuleConfig, deps: &RuleDeps) -> Result<Arc<dyn Rule>, GuardError> {
        let factory = self
            .factories
            .get(&cfg.rule_type)
            .ok_or_else(|| GuardError::UnknownRuleType(cfg.rule_type.clone()))?;
        factory(cfg, deps)
    }

    pub fn known_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Decode a rule's free-form params map into a typed struct through a JSON
/// round trip; missing keys take the struct's serde defaults.
pub(crate) fn decode_params<T: serde::de::DeserializeOwned>(
    cfg: &RuleConfig,
) -> Result<T, GuardError> {
    serde_json::from_value(Value::Object(cfg.params.clone())).map_err(|e| {
        GuardError::Config(format!("rule {}: invalid params: {e}", cfg.id))
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
