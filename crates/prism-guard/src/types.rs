// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Verdict lattice ──────────────────────────────────────────────────────────

/// Rule outcome, ordered by severity: `allow < review < redact < block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Allow,
    Review,
    Redact,
    Block,
}

impl Verdict {
    pub fn severity(self) -> u8 {
        match self {
            Self::Allow => 1,
            Self::Review => 2,
            Self::Redact => 3,
            Self::Block => 4,
        }
    }

    /// The more severe of the two.
    pub fn max(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Review => "review",
            Self::Redact => "redact",
            Self::Block => "block",
        }
    }
}

/// How rule verdicts are folded into the final verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineStrategy {
    /// Final verdict is the maximum severity seen.
    #[default]
    MostSevere,
    /// Any `block` pins the final verdict to `block`; otherwise the maximum
    /// severity seen.
    BlockOnAny,
}

/// Verdict merged in when a rule fails to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    #[default]
    Allow,
    Review,
    Block,
}

impl ErrorStrategy {
    pub fn verdict(self) -> Verdict {
        match self {
            Self::Allow => Verdict::Allow,
            Self::Review => Verdict::Review,
            Self::Block => Verdict::Block,
        }
    }
}

// ─── Input record ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Messages,
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandContent {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,
}

/// The views a guardrail input may populate.  At least one must be present
/// for any rule to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ContentMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandContent>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::default() }
    }

    pub fn messages(messages: Vec<ContentMessage>) -> Self {
        Self { messages: Some(messages), ..Self::default() }
    }

    /// The content types this value populates.
    pub fn content_types(&self) -> Vec<ContentType> {
        let mut types = Vec::new();
        if self.text.is_some() {
            types.push(ContentType::Text);
        }
        if self.messages.is_some() {
            types.push(ContentType::Messages);
        }
        if self.command.is_some() {
            types.push(ContentType::Command);
        }
        types
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.messages.is_none() && self.command.is_none()
    }

    /// Keep only the views named in `targets`.  An empty target list keeps
    /// everything.
    pub fn filter(&self, targets: &[ContentType]) -> Content {
        if targets.is_empty() {
            return self.clone();
        }
        Content {
            text: targets.contains(&ContentType::Text).then(|| self.text.clone()).flatten(),
            messages: targets
                .contains(&ContentType::Messages)
                .then(|| self.messages.clone())
                .flatten(),
            command: targets
                .contains(&ContentType::Command)
                .then(|| self.command.clone())
                .flatten(),
        }
    }
}

/// Normalized guardrail input: one direction of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub scenario: String,
    pub model: String,
    pub direction: Direction,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: Content,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

// ─── Rule results and scope ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: String,
    /// Missing on the wire normalizes to `allow`.
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub evidence: serde_json::Map<String, Value>,
}

/// Pre-evaluation filter.  Every populated list must overlap the input;
/// empty lists (and the empty scope) match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub directions: Vec<Direction>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub content_types: Vec<ContentType>,
}

impl Scope {
    pub fn matches(&self, input: &Input) -> bool {
        if !self.scenarios.is_empty() && !self.scenarios.contains(&input.scenario) {
            return false;
        }
        if !self.models.is_empty() && !self.models.contains(&input.model) {
            return false;
        }
        if !self.directions.is_empty() && !self.directions.contains(&input.direction) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| input.tags.contains(t)) {
            return false;
        }
        if !self.content_types.is_empty() {
            let present = input.content.content_types();
            if !self.content_types.iter().any(|ct| present.contains(ct)) {
                return false;
            }
        }
        true
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
