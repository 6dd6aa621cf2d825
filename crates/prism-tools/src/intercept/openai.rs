// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};

use prism_model::{ChatCompletionRequest, ChatMessage};
use serde_json::Value;

use super::{intercepted_tool, HandlerKind, PrepareOutcome, ToolExecutor};

/// Shape adapter for OpenAI-style requests.
///
/// Tool results use `role=tool` messages bound by `tool_call_id`; an
/// already-answered call (a tool message with the same id) is never
/// re-executed.
pub(super) async fn prepare(
    executor: &dyn ToolExecutor,
    req: &mut ChatCompletionRequest,
) -> PrepareOutcome {
    let Some(tools) = req.tools.take() else {
        return PrepareOutcome::default();
    };
    if tools.is_empty() {
        req.tools = Some(tools);
        return PrepareOutcome::default();
    }

    let mut forwarded = Vec::with_capacity(tools.len());
    let mut stripped: HashMap<String, HandlerKind> = HashMap::new();
    for tool in tools {
        match intercepted_tool(&tool.function.name) {
            Some(kind) => {
                stripped.insert(tool.function.name.clone(), kind);
            }
            None => forwarded.push(tool),
        }
    }
    if stripped.is_empty() {
        req.tools = Some(forwarded);
        return PrepareOutcome::default();
    }

    let all_stripped = forwarded.is_empty();
    req.tools = if all_stripped { None } else { Some(forwarded) };

    // Calls already answered earlier in the history.
    let answered: HashSet<String> = req
        .messages
        .iter()
        .filter(|m| m.role == "tool")
        .filter_map(|m| m.tool_call_id.clone())
        .collect();

    // Pending calls to stripped tools, in document order.
    let mut pending: Vec<(String, HandlerKind, String)> = Vec::new();
    for msg in &req.messages {
        if !msg.is_assistant() {
            continue;
        }
        let Some(calls) = &msg.tool_calls else { continue };
        for call in calls {
            if answered.contains(&call.id) {
                continue;
            }
            if let Some(kind) = stripped.get(&call.function.name) {
                pending.push((call.id.clone(), *kind, call.function.arguments.clone()));
            }
        }
    }

    let mut injected = false;
    for (id, kind, arguments) in pending {
        let result = executor.execute(kind, &id, &arguments).await;
        req.messages.push(ChatMessage::tool_result(result.call_id, result.content));
        injected = true;
    }

    if all_stripped && choice_references_only(&req.tool_choice, &stripped) {
        req.tool_choice = None;
    }

    PrepareOutcome {
        has_pre_injected_results: injected,
        stripped_tools: {
            let mut names: Vec<String> = stripped.into_keys().collect();
            names.sort();
            names
        },
    }
}

/// True when `tool_choice` names a stripped tool (`{"type": "function",
/// "function": {"name": …}}`).  Mode strings like `"auto"` reference no
/// names and are left alone.
fn choice_references_only(
    choice: &Option<Value>,
    stripped: &HashMap<String, HandlerKind>,
) -> bool {
    let Some(choice) = choice else { return false };
    choice
        .get("function")
        .and_then(|f| f.get("name"))
        .and_then(|n| n.as_str())
        .map(|name| stripped.contains_key(name))
        .unwrap_or(false)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::intercept::ToolResult;

    /// Stub executor that answers every call with a canned payload.
    struct StubExecutor;

    #[async_trait]
    impl ToolExecutor for StubExecutor {
        async fn execute(&self, kind: HandlerKind, call_id: &str, arguments: &str) -> ToolResult {
            match kind {
                HandlerKind::Search => {
                    let args: Value = serde_json::from_str(arguments).unwrap_or(Value::Null);
                    if args.get("query").and_then(|q| q.as_str()).unwrap_or("").is_empty() {
                        return ToolResult::err(call_id, "missing 'query'");
                    }
                    ToolResult::ok(call_id, json!({"results": [{"title": "t", "url": "https://x", "snippet": "s"}]}).to_string())
                }
                HandlerKind::Fetch => ToolResult::ok(call_id, "page text"),
            }
        }
    }

    fn request(raw: Value) -> ChatCompletionRequest {
        serde_json::from_value(raw).unwrap()
    }

    fn search_request() -> ChatCompletionRequest {
        request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "find golang"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "tc_1", "type": "function",
                     "function": {"name": "web_search", "arguments": "{\"query\":\"golang\"}"}}
                ]}
            ],
            "tools": [
                {"type": "function", "function": {"name": "web_search"}}
            ],
            "tool_choice": {"type": "function", "function": {"name": "web_search"}}
        }))
    }

    #[tokio::test]
    async fn strips_tools_and_injects_result() {
        let mut req = search_request();
        let outcome = prepare(&StubExecutor, &mut req).await;

        assert!(outcome.has_pre_injected_results);
        assert_eq!(outcome.stripped_tools, vec!["web_search".to_string()]);
        assert!(req.tools.is_none(), "all declared tools were intercepted");
        assert!(req.tool_choice.is_none(), "tool_choice referencing a stripped tool is reset");

        let last = req.messages.last().unwrap();
        assert_eq!(last.role, "tool");
        assert_eq!(last.tool_call_id.as_deref(), Some("tc_1"));
        let body: Value = serde_json::from_str(&last.text()).unwrap();
        assert!(body["results"].is_array());
    }

    #[tokio::test]
    async fn no_declared_tools_is_identity() {
        let raw = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let mut req = request(raw.clone());
        let outcome = prepare(&StubExecutor, &mut req).await;
        assert!(!outcome.has_pre_injected_results);
        assert!(outcome.stripped_tools.is_empty());
        assert_eq!(serde_json::to_value(&req).unwrap(), raw);
    }

    #[tokio::test]
    async fn non_intercepted_tools_are_forwarded_untouched() {
        let mut req = request(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [
                {"type": "function", "function": {"name": "calculator"}},
                {"type": "function", "function": {"name": "web_search"}}
            ]
        }));
        let outcome = prepare(&StubExecutor, &mut req).await;
        assert_eq!(outcome.stripped_tools, vec!["web_search".to_string()]);
        let tools = req.tools.as_ref().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "calculator");
    }

    #[tokio::test]
    async fn already_answered_call_is_not_reexecuted() {
        let mut req = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "tc_1", "type": "function",
                     "function": {"name": "web_search", "arguments": "{\"query\":\"x\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "tc_1", "content": "earlier answer"}
            ],
            "tools": [{"type": "function", "function": {"name": "web_search"}}]
        }));
        let before = req.messages.len();
        let outcome = prepare(&StubExecutor, &mut req).await;
        assert!(!outcome.has_pre_injected_results);
        assert_eq!(req.messages.len(), before);
    }

    #[tokio::test]
    async fn results_are_appended_in_document_order() {
        let mut req = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "tc_a", "type": "function",
                     "function": {"name": "web_search", "arguments": "{\"query\":\"one\"}"}},
                    {"id": "tc_b", "type": "function",
                     "function": {"name": "web_fetch", "arguments": "{\"url\":\"https://x\"}"}}
                ]}
            ],
            "tools": [
                {"type": "function", "function": {"name": "web_search"}},
                {"type": "function", "function": {"name": "web_fetch"}}
            ]
        }));
        prepare(&StubExecutor, &mut req).await;
        let tail: Vec<_> = req.messages[2..]
            .iter()
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(tail, vec!["tc_a".to_string(), "tc_b".to_string()]);
    }

    #[tokio::test]
    async fn mode_string_tool_choice_is_preserved() {
        let mut req = request(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "q"}],
            "tools": [{"type": "function", "function": {"name": "web_search"}}],
            "tool_choice": "auto"
        }));
        prepare(&StubExecutor, &mut req).await;
        assert_eq!(req.tool_choice, Some(json!("auto")));
    }

    #[tokio::test]
    async fn empty_query_arguments_yield_error_result() {
        let mut req = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "tc_1", "type": "function",
                     "function": {"name": "web_search", "arguments": "{}"}}
                ]}
            ],
            "tools": [{"type": "function", "function": {"name": "web_search"}}]
        }));
        let outcome = prepare(&StubExecutor, &mut req).await;
        assert!(outcome.has_pre_injected_results, "error results still answer the call");
        let last = req.messages.last().unwrap();
        assert!(last.text().contains("missing 'query'"));
    }
}
