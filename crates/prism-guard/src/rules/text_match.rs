// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Pattern-matching rule: literal substring or regex, `any`/`all` modes,
//! optional minimum match count.

use std::sync::Arc;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::RuleConfig;
use crate::error::GuardError;
use crate::rule::{decode_params, Rule, RuleDeps};
use crate::types::{ContentType, Input, RuleResult, Scope, Verdict};

pub const RULE_TYPE: &str = "text_match";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MatchMode {
    #[default]
    Any,
    All,
}

#[derive(Debug, Deserialize)]
struct Params {
    patterns: Vec<String>,
    #[serde(default)]
    mode: MatchMode,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default)]
    use_regex: bool,
    #[serde(default)]
    min_matches: Option<usize>,
    #[serde(default = "default_verdict")]
    verdict: Verdict,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    targets: Vec<ContentType>,
}

fn default_verdict() -> Verdict {
    Verdict::Block
}

enum Matcher {
    Literal { pattern: String, lowered: String },
    Regex { pattern: String, re: regex::Regex },
}

impl Matcher {
    fn matches(&self, text: &str, lowered_text: &str, case_sensitive: bool) -> bool {
        match self {
            Self::Literal { pattern, lowered } => {
                if case_sensitive {
                    text.contains(pattern.as_str())
                } else {
                    lowered_text.contains(lowered.as_str())
                }
            }
            Self::Regex { re, .. } => re.is_match(text),
        }
    }

    fn pattern(&self) -> &str {
        match self {
            Self::Literal { pattern, .. } | Self::Regex { pattern, .. } => pattern,
        }
    }
}

pub struct TextMatchRule {
    id: String,
    name: String,
    scope: Scope,
    matchers: Vec<Matcher>,
    mode: MatchMode,
    case_sensitive: bool,
    min_matches: Option<usize>,
    verdict: Verdict,
    reason: String,
    targets: Vec<ContentType>,
}

/// Factory registered under [`RULE_TYPE`].
pub fn build(cfg: &RuleConfig, _deps: &RuleDeps) -> Result<Arc<dyn Rule>, GuardError> {
    let params: Params = decode_params(cfg)?;
    if params.patterns.is_empty() {
        return Err(GuardError::Config(format!(
            "rule {}: patterns must not be empty",
            cfg.id
        )));
    }

    let matchers = params
        .patterns
        .iter()
        .map(|pattern| {
            if params.use_regex {
                RegexBuilder::new(pattern)
                    .case_insensitive(!params.case_sensitive)
                    .build()
                    .map(|re| Matcher::Regex { pattern: pattern.clone(), re })
                    .map_err(|e| {
                        GuardError::Config(format!("rule {}: bad pattern {pattern:?}: {e}", cfg.id))
                    })
            } else {
                Ok(Matcher::Literal { pattern: pattern.clone(), lowered: pattern.to_lowercase() })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(TextMatchRule {
        id: cfg.id.clone(),
        name: cfg.name.clone(),
        scope: cfg.scope.clone(),
        matchers,
        mode: params.mode,
        case_sensitive: params.case_sensitive,
        min_matches: params.min_matches,
        verdict: params.verdict,
        reason: params.reason,
        targets: params.targets,
    }))
}

impl TextMatchRule {
    /// Assemble the text view the patterns run against: the plain text view
    /// when selected, message history as `role: content` lines, and a
    /// `command: <name> arguments: <json>` suffix when command content is
    /// selected.
    fn view(&self, input: &Input) -> String {
        let content = input.content.filter(&self.targets);
        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = &content.text {
            parts.push(text.clone());
        }
        if let Some(messages) = &content.messages {
            for m in messages {
                parts.push(format!("{}: {}", m.role, m.content));
            }
        }
        if let Some(command) = &content.command {
            let arguments =
                serde_json::to_string(&command.arguments).unwrap_or_else(|_| "{}".into());
            parts.push(format!("command: {} arguments: {}", command.name, arguments));
        }
        parts.join("\n")
    }

    fn allow(&self) -> RuleResult {
        RuleResult {
            rule_id: self.id.clone(),
            rule_name: self.name.clone(),
            rule_type: RULE_TYPE.into(),
            verdict: Verdict::Allow,
            reason: String::new(),
            evidence: Default::default(),
        }
    }
}

#[async_trait]
impl Rule for TextMatchRule {
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
        let text = self.view(input);
        if text.is_empty() {
            return Ok(self.allow());
        }
        let lowered = text.to_lowercase();

        let matched: Vec<&str> = self
            .matchers
            .iter()
            .filter(|m| m.matches(&text, &lowered, self.case_sensitive))
            .map(|m| m.pattern())
            .collect();
        let matches = matched.len();

        let triggered = match self.min_matches {
            Some(min) => matches >= min,
            None => match self.mode {
                MatchMode::Any => matches >= 1,
                MatchMode::All => matches == self.matchers.len(),
            },
        };
        if !triggered {
            return Ok(self.allow());
        }

        let mut evidence = serde_json::Map::new();
        evidence.insert("matches".into(), json!(matches));
        evidence.insert(
            "matched_patterns".into(),
            Value::Array(matched.iter().map(|p| json!(p)).collect()),
        );
        Ok(RuleResult {
            rule_id: self.id.clone(),
            rule_name: self.name.clone(),
            rule_type: RULE_TYPE.into(),
            verdict: self.verdict,
            reason: self.reason.clone(),
            evidence,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::types::{CommandContent, Content, ContentMessage, Direction};

    fn rule(params: Value) -> Arc<dyn Rule> {
        let cfg = RuleConfig {
            id: "r1".into(),
            name: "dangerous commands".into(),
            rule_type: RULE_TYPE.into(),
            enabled: true,
            scope: Scope::default(),
            params: params.as_object().cloned().unwrap_or_default(),
        };
        build(&cfg, &RuleDeps::default()).unwrap()
    }

    fn text_input(text: &str) -> Input {
        Input {
            scenario: "chat".into(),
            model: "m".into(),
            direction: Direction::Request,
            tags: vec![],
            content: Content::text(text),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn case_insensitive_any_match_blocks() {
        let r = rule(json!({"patterns": ["rm -rf", "format c:"], "mode": "any"}));
        let result = r.evaluate(&text_input("Please run RM -RF / now")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Block);
        assert_eq!(result.evidence["matches"], json!(1));
        assert_eq!(result.evidence["matched_patterns"], json!(["rm -rf"]));
    }

    #[tokio::test]
    async fn no_match_allows_with_empty_evidence() {
        let r = rule(json!({"patterns": ["rm -rf"]}));
        let result = r.evaluate(&text_input("harmless text")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Allow);
        assert!(result.evidence.is_empty());
    }

    #[tokio::test]
    async fn case_sensitive_literal_respects_case() {
        let r = rule(json!({"patterns": ["rm -rf"], "case_sensitive": true}));
        let result = r.evaluate(&text_input("RM -RF")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Allow);
        let result = r.evaluate(&text_input("rm -rf /")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[tokio::test]
    async fn all_mode_requires_every_pattern() {
        let r = rule(json!({"patterns": ["foo", "bar"], "mode": "all"}));
        let result = r.evaluate(&text_input("only foo here")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Allow);
        let result = r.evaluate(&text_input("foo and bar")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Block);
        assert_eq!(result.evidence["matches"], json!(2));
    }

    #[tokio::test]
    async fn min_matches_overrides_mode() {
        let r = rule(json!({"patterns": ["a", "b", "c"], "mode": "all", "min_matches": 2}));
        let result = r.evaluate(&text_input("a and b")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Block, "2 of 3 satisfies min_matches=2");
    }

    #[tokio::test]
    async fn regex_patterns_match() {
        let r = rule(json!({"patterns": ["rm\\s+-rf"], "use_regex": true}));
        let result = r.evaluate(&text_input("run rm   -rf please")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[test]
    fn invalid_regex_fails_at_build() {
        let cfg = RuleConfig {
            id: "r1".into(),
            name: "r".into(),
            rule_type: RULE_TYPE.into(),
            enabled: true,
            scope: Scope::default(),
            params: json!({"patterns": ["("], "use_regex": true})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert!(build(&cfg, &RuleDeps::default()).is_err());
    }

    #[test]
    fn empty_patterns_fail_at_build() {
        let cfg = RuleConfig {
            id: "r1".into(),
            name: "r".into(),
            rule_type: RULE_TYPE.into(),
            enabled: true,
            scope: Scope::default(),
            params: json!({"patterns": []}).as_object().cloned().unwrap(),
        };
        assert!(matches!(build(&cfg, &RuleDeps::default()), Err(GuardError::Config(_))));
    }

    #[tokio::test]
    async fn custom_verdict_and_reason_are_emitted() {
        let r = rule(json!({"patterns": ["secret"], "verdict": "review", "reason": "flag it"}));
        let result = r.evaluate(&text_input("a secret plan")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Review);
        assert_eq!(result.reason, "flag it");
    }

    #[tokio::test]
    async fn message_view_serializes_roles() {
        let r = rule(json!({"patterns": ["assistant: leak"], "targets": ["messages"]}));
        let input = Input {
            scenario: "chat".into(),
            model: "m".into(),
            direction: Direction::Request,
            tags: vec![],
            content: Content::messages(vec![
                ContentMessage { role: "user".into(), content: "hi".into() },
                ContentMessage { role: "assistant".into(), content: "leak".into() },
            ]),
            metadata: HashMap::new(),
        };
        let result = r.evaluate(&input).await.unwrap();
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[tokio::test]
    async fn command_view_includes_name_and_arguments() {
        let r = rule(json!({"patterns": ["command: rm"], "targets": ["command"]}));
        let mut arguments = serde_json::Map::new();
        arguments.insert("path".into(), json!("/"));
        let input = Input {
            scenario: "chat".into(),
            model: "m".into(),
            direction: Direction::Request,
            tags: vec![],
            content: Content {
                text: Some("unrelated".into()),
                messages: None,
                command: Some(CommandContent { name: "rm".into(), arguments }),
            },
            metadata: HashMap::new(),
        };
        let result = r.evaluate(&input).await.unwrap();
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[tokio::test]
    async fn targets_exclude_unselected_views() {
        // Pattern present only in text; rule targets messages, so no match.
        let r = rule(json!({"patterns": ["secret"], "targets": ["messages"]}));
        let result = r.evaluate(&text_input("the secret")).await.unwrap();
        assert_eq!(result.verdict, Verdict::Allow);
    }
}
