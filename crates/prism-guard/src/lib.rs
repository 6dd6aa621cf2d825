// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Guardrails: a rule-evaluation pipeline over normalized request/response
//! content.
//!
//! Rules are registered through factories keyed by a type tag, built from a
//! YAML/JSON configuration document, scope-filtered per input, and evaluated
//! sequentially so verdict ordering and short-circuiting stay deterministic.
//! Verdicts form an ordered lattice `allow < review < redact < block`.

pub mod config;
pub mod engine;
pub mod error;
pub mod rule;
pub mod rules;
pub mod types;

pub use config::{load_rules_document, GuardrailsConfig, RuleConfig};
pub use engine::{Evaluation, GuardEngine, RuleError};
pub use error::GuardError;
pub use rule::{Judge, JudgeDecision, JudgeError, Rule, RuleDeps, RuleRegistry};
pub use types::{
    CombineStrategy, CommandContent, Content, ContentMessage, ContentType, Direction,
    ErrorStrategy, Input, RuleResult, Scope, Verdict,
};
