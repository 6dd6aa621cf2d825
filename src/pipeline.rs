// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use prism_config::{CompactSettings, Config};
use prism_core::compact_thinking;
use prism_guard::{Content, ContentMessage, Direction, Evaluation, GuardEngine, Input};
use prism_model::{ChatCompletionRequest, MessagesRequest};
use prism_tools::{Interceptor, ToolCache, ToolExecutor};
use tracing::debug;

/// What one pass over a request did.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// Tool results were executed locally and appended to the history.
    pub pre_injected: bool,
    /// Tool declarations removed from the request.
    pub stripped_tools: Vec<String>,
    /// Assistant messages that lost thinking content.
    pub compacted: usize,
    /// Guardrail evaluation, when an engine is configured.
    pub evaluation: Option<Evaluation>,
}

impl PipelineOutcome {
    /// The request must not be forwarded upstream.
    pub fn is_blocked(&self) -> bool {
        self.evaluation.as_ref().map(|e| e.is_blocked()).unwrap_or(false)
    }
}

/// The per-request transformation pipeline: interception, compaction, and
/// request-direction guardrails, strictly in that order.
pub struct Pipeline {
    interceptor: Interceptor,
    compact: CompactSettings,
    guard: Option<GuardEngine>,
    scenario: String,
}

impl Pipeline {
    pub fn new(
        interceptor: Interceptor,
        compact: CompactSettings,
        guard: Option<GuardEngine>,
    ) -> Self {
        Self { interceptor, compact, guard, scenario: "proxy".into() }
    }

    /// Pipeline with live search/fetch handlers per `config`.  The guardrail
    /// engine, being dependency-injected (judge), is supplied by the caller.
    pub fn from_config(config: &Config, guard: Option<GuardEngine>) -> anyhow::Result<Self> {
        let cache = Arc::new(ToolCache::new(config.cache.clone()));
        let interceptor = Interceptor::live(
            config.intercept.clone(),
            config.search.clone(),
            config.fetch.clone(),
            cache,
        )?;
        Ok(Self::new(interceptor, config.compact.clone(), guard))
    }

    /// Pipeline with a custom tool executor (tests, recording proxies).
    pub fn with_executor(
        config: &Config,
        executor: Arc<dyn ToolExecutor>,
        guard: Option<GuardEngine>,
    ) -> Self {
        Self::new(
            Interceptor::new(config.intercept.clone(), executor),
            config.compact.clone(),
            guard,
        )
    }

    /// The scenario tag guardrail inputs carry.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    /// Process an OpenAI-shaped request in place.
    pub async fn process_openai(&self, req: &mut ChatCompletionRequest) -> PipelineOutcome {
        let prepared = self.interceptor.prepare_openai(req).await;
        let compacted = if self.compact.enabled {
            compact_thinking(&mut req.messages, self.compact.keep_recent_rounds)
        } else {
            0
        };
        let evaluation = match &self.guard {
            Some(engine) => {
                let content = Content {
                    text: None,
                    messages: Some(
                        req.messages
                            .iter()
                            .map(|m| ContentMessage { role: m.role.clone(), content: m.text() })
                            .collect(),
                    ),
                    command: None,
                };
                Some(engine.evaluate(&self.input(&req.model, content)).await)
            }
            None => None,
        };
        debug!(
            pre_injected = prepared.has_pre_injected_results,
            compacted,
            blocked = evaluation.as_ref().map(|e| e.is_blocked()).unwrap_or(false),
            "processed openai-shape request"
        );
        PipelineOutcome {
            pre_injected: prepared.has_pre_injected_results,
            stripped_tools: prepared.stripped_tools,
            compacted,
            evaluation,
        }
    }

    /// Process an Anthropic-shaped request in place.
    pub async fn process_anthropic(&self, req: &mut MessagesRequest) -> PipelineOutcome {
        let prepared = self.interceptor.prepare_anthropic(req).await;
        let compacted = if self.compact.enabled {
            compact_thinking(&mut req.messages, self.compact.keep_recent_rounds)
        } else {
            0
        };
        let evaluation = match &self.guard {
            Some(engine) => {
                let content = Content {
                    text: None,
                    messages: Some(
                        req.messages
                            .iter()
                            .map(|m| ContentMessage { role: m.role.clone(), content: m.text() })
                            .collect(),
                    ),
                    command: None,
                };
                Some(engine.evaluate(&self.input(&req.model, content)).await)
            }
            None => None,
        };
        debug!(
            pre_injected = prepared.has_pre_injected_results,
            compacted,
            blocked = evaluation.as_ref().map(|e| e.is_blocked()).unwrap_or(false),
            "processed anthropic-shape request"
        );
        PipelineOutcome {
            pre_injected: prepared.has_pre_injected_results,
            stripped_tools: prepared.stripped_tools,
            compacted,
            evaluation,
        }
    }

    /// Evaluate guardrails over completion text flowing back to the client.
    /// Returns `None` when no engine is configured.
    pub async fn evaluate_response(&self, model: &str, text: &str) -> Option<Evaluation> {
        let engine = self.guard.as_ref()?;
        let mut input = self.input(model, Content::text(text));
        input.direction = Direction::Response;
        Some(engine.evaluate(&input).await)
    }

    fn input(&self, model: &str, content: Content) -> Input {
        Input {
            scenario: self.scenario.clone(),
            model: model.to_string(),
            direction: Direction::Request,
            tags: Vec::new(),
            content,
            metadata: HashMap::new(),
        }
    }
}
