// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! prism — a request-transforming proxy core for LLM provider APIs.
//!
//! The [`Pipeline`] applies the per-request transformations in order:
//! tool interception (strip declared tools the proxy serves itself and
//! answer their in-flight calls), smart compaction (drop thinking content
//! from old conversation rounds), and guardrail evaluation.  The identity
//! and access core lives in [`prism_auth`] and gates access orthogonally.

mod pipeline;

pub use pipeline::{Pipeline, PipelineOutcome};

pub use prism_auth as auth;
pub use prism_config as config;
pub use prism_core as rounds;
pub use prism_guard as guard;
pub use prism_model as model;
pub use prism_tools as tools;
