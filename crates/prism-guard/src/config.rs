// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Rules-configuration document and engine construction.
//!
//! The document is YAML (JSON parses as a YAML subset).  Unknown rule types
//! fail here, at load time, never during evaluation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::GuardEngine;
use crate::error::GuardError;
use crate::rule::{Rule, RuleDeps, RuleRegistry};
use crate::types::{CombineStrategy, ErrorStrategy, Scope};

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub strategy: CombineStrategy,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    #[serde(default)]
    pub short_circuit: bool,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Parse a rules document from text.
pub fn load_rules_document(text: &str) -> Result<GuardrailsConfig, GuardError> {
    serde_yaml::from_str(text)
        .map_err(|e| GuardError::Config(format!("invalid rules document: {e}")))
}

impl GuardrailsConfig {
    /// Build every enabled rule through `registry` and assemble the engine.
    pub fn build_engine(
        &self,
        registry: &RuleRegistry,
        deps: &RuleDeps,
    ) -> Result<GuardEngine, GuardError> {
        let rules = self.build_rules(registry, deps)?;
        debug!(rules = rules.len(), strategy = ?self.strategy, "guard engine built");
        Ok(GuardEngine::new(self.strategy, self.error_strategy, self.short_circuit, rules))
    }

    fn build_rules(
        &self,
        registry: &RuleRegistry,
        deps: &RuleDeps,
    ) -> Result<Vec<std::sync::Arc<dyn Rule>>, GuardError> {
        self.rules
            .iter()
            .filter(|cfg| cfg.enabled)
            .map(|cfg| registry.build(cfg, deps))
            .collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const YAML_DOC: &str = r#"
version: 1
strategy: most_severe
error_strategy: review
short_circuit: true
rules:
  - id: no-wipe
    name: destructive commands
    type: text_match
    params:
      patterns: ["rm -rf", "format c:"]
      mode: any
  - id: disabled-rule
    name: disabled
    type: text_match
    enabled: false
    params:
      patterns: ["x"]
"#;

    #[test]
    fn yaml_document_parses() {
        let cfg = load_rules_document(YAML_DOC).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.strategy, CombineStrategy::MostSevere);
        assert_eq!(cfg.error_strategy, ErrorStrategy::Review);
        assert!(cfg.short_circuit);
        assert_eq!(cfg.rules.len(), 2);
    }

    #[test]
    fn json_document_parses_too() {
        let json = r#"{
            "version": 1,
            "strategy": "block_on_any",
            "rules": [
                {"id": "r1", "name": "n", "type": "text_match",
                 "params": {"patterns": ["a"]}}
            ]
        }"#;
        let cfg = load_rules_document(json).unwrap();
        assert_eq!(cfg.strategy, CombineStrategy::BlockOnAny);
        assert_eq!(cfg.rules.len(), 1);
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let cfg = load_rules_document("rules: []").unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.strategy, CombineStrategy::MostSevere);
        assert_eq!(cfg.error_strategy, ErrorStrategy::Allow);
        assert!(!cfg.short_circuit);
    }

    #[test]
    fn disabled_rules_are_not_built() {
        let cfg = load_rules_document(YAML_DOC).unwrap();
        let engine = cfg.build_engine(&RuleRegistry::builtin(), &RuleDeps::default()).unwrap();
        assert_eq!(engine.rule_count(), 1);
    }

    #[test]
    fn unknown_rule_type_fails_at_load() {
        let doc = r#"
rules:
  - id: r1
    name: n
    type: llm_firewall
"#;
        let cfg = load_rules_document(doc).unwrap();
        let err = cfg.build_engine(&RuleRegistry::builtin(), &RuleDeps::default()).unwrap_err();
        assert!(matches!(err, GuardError::UnknownRuleType(t) if t == "llm_firewall"));
    }

    #[test]
    fn scope_parses_inside_rule_config() {
        let doc = r#"
rules:
  - id: r1
    name: n
    type: text_match
    scope:
      directions: [request]
      tags: [external]
    params:
      patterns: ["a"]
"#;
        let cfg = load_rules_document(doc).unwrap();
        assert_eq!(cfg.rules[0].scope.tags, vec!["external".to_string()]);
    }
}
