// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The tool interceptor.
//!
//! Inbound requests may declare tools the proxy serves locally (web search,
//! URL fetch).  Preparation strips those declarations so the upstream never
//! sees them, executes any already-issued calls to them found in the message
//! history, and appends the results in the wire form the shape expects.
//! Every issued call is answered: execution failures become `is_error`
//! results, never transport errors.

mod anthropic;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use prism_config::{FetchSettings, InterceptSettings, SearchSettings};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cache::ToolCache;
use crate::error::ToolError;
use crate::fetch::FetchHandler;
use crate::search::SearchHandler;

/// Which local handler serves an intercepted tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Search,
    Fetch,
}

/// Alias table: case-exact tool names the proxy answers itself.
const TOOL_ALIASES: &[(&str, HandlerKind)] = &[
    ("web_search", HandlerKind::Search),
    ("Google Search", HandlerKind::Search),
    ("search", HandlerKind::Search),
    ("bing_search", HandlerKind::Search),
    ("web_fetch", HandlerKind::Fetch),
    ("browse", HandlerKind::Fetch),
    ("read_url", HandlerKind::Fetch),
    ("get_page_content", HandlerKind::Fetch),
];

pub fn intercepted_tool(name: &str) -> Option<HandlerKind> {
    TOOL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, kind)| *kind)
}

pub fn should_intercept_tool(name: &str) -> bool {
    intercepted_tool(name).is_some()
}

/// The answer to one tool call.  `call_id` echoes the upstream identifier
/// verbatim; on failure `content` carries the human-readable message.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false, error_message: None }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let text = msg.into();
        Self {
            call_id: call_id.into(),
            content: text.clone(),
            is_error: true,
            error_message: Some(text),
        }
    }
}

/// Executes one intercepted call.  The live implementation dispatches to the
/// search/fetch handlers; tests substitute a stub.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, kind: HandlerKind, call_id: &str, arguments: &str) -> ToolResult;
}

/// What preparation did to a request.
#[derive(Debug, Clone, Default)]
pub struct PrepareOutcome {
    /// At least one tool result was executed and appended.
    pub has_pre_injected_results: bool,
    /// Names of the tool declarations removed from the request.
    pub stripped_tools: Vec<String>,
}

// ── Live executor ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FetchArgs {
    #[serde(default)]
    url: String,
}

const DEFAULT_SEARCH_COUNT: usize = 5;

/// Production executor backed by the real search and fetch handlers.
pub struct LiveExecutor {
    search: SearchHandler,
    fetch: FetchHandler,
}

impl LiveExecutor {
    pub fn new(
        search_settings: SearchSettings,
        fetch_settings: FetchSettings,
        cache: Arc<ToolCache>,
    ) -> Result<Self, ToolError> {
        Ok(Self {
            search: SearchHandler::new(search_settings, Arc::clone(&cache))?,
            fetch: FetchHandler::new(fetch_settings, cache)?,
        })
    }
}

#[async_trait]
impl ToolExecutor for LiveExecutor {
    async fn execute(&self, kind: HandlerKind, call_id: &str, arguments: &str) -> ToolResult {
        match kind {
            HandlerKind::Search => {
                let args: SearchArgs = match serde_json::from_str(arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::err(call_id, format!("invalid arguments: {e}")),
                };
                if args.query.trim().is_empty() {
                    return ToolResult::err(call_id, "missing 'query'");
                }
                let count = args.count.unwrap_or(DEFAULT_SEARCH_COUNT as u64) as usize;
                match self.search.search(&args.query, count).await {
                    Ok(results) => {
                        let body = json!({ "results": results });
                        ToolResult::ok(call_id, body.to_string())
                    }
                    Err(e) => ToolResult::err(call_id, format!("search error: {e}")),
                }
            }
            HandlerKind::Fetch => {
                let args: FetchArgs = match serde_json::from_str(arguments) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::err(call_id, format!("invalid arguments: {e}")),
                };
                if args.url.trim().is_empty() {
                    return ToolResult::err(call_id, "missing 'url'");
                }
                match self.fetch.fetch(&args.url).await {
                    Ok(text) => ToolResult::ok(call_id, text),
                    Err(e) => ToolResult::err(call_id, format!("fetch error: {e}")),
                }
            }
        }
    }
}

// ── Interceptor ───────────────────────────────────────────────────────────────

pub struct Interceptor {
    settings: InterceptSettings,
    executor: Arc<dyn ToolExecutor>,
}

impl Interceptor {
    pub fn new(settings: InterceptSettings, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { settings, executor }
    }

    /// Interceptor wired to the live search/fetch handlers.
    pub fn live(
        settings: InterceptSettings,
        search_settings: SearchSettings,
        fetch_settings: FetchSettings,
        cache: Arc<ToolCache>,
    ) -> Result<Self, ToolError> {
        let executor = LiveExecutor::new(search_settings, fetch_settings, cache)?;
        Ok(Self::new(settings, Arc::new(executor)))
    }

    /// Prepare an OpenAI-shaped request: strip intercepted tool declarations
    /// and answer their pending calls in document order.
    pub async fn prepare_openai(
        &self,
        req: &mut prism_model::ChatCompletionRequest,
    ) -> PrepareOutcome {
        if !self.settings.openai {
            return PrepareOutcome::default();
        }
        let outcome = openai::prepare(self.executor.as_ref(), req).await;
        if !outcome.stripped_tools.is_empty() {
            debug!(stripped = ?outcome.stripped_tools, "intercepted openai-shape tools");
        }
        outcome
    }

    /// Prepare an Anthropic-shaped request; same contract as
    /// [`Self::prepare_openai`].
    pub async fn prepare_anthropic(
        &self,
        req: &mut prism_model::MessagesRequest,
    ) -> PrepareOutcome {
        if !self.settings.anthropic {
            return PrepareOutcome::default();
        }
        let outcome = anthropic::prepare(self.executor.as_ref(), req).await;
        if !outcome.stripped_tools.is_empty() {
            debug!(stripped = ?outcome.stripped_tools, "intercepted anthropic-shape tools");
        }
        outcome
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
