// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("invalid rule configuration: {0}")]
    Config(String),

    #[error("unknown rule type: {0}")]
    UnknownRuleType(String),

    #[error("judge unavailable: {0}")]
    JudgeUnavailable(String),

    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}
