// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};

use prism_model::{ContentBlock, MessageContent, MessageParam, MessagesRequest};
use serde_json::Value;

use super::{intercepted_tool, HandlerKind, PrepareOutcome, ToolExecutor};

/// Shape adapter for Anthropic-style requests.
///
/// Tool calls are `tool_use` blocks inside assistant messages; each answer
/// is appended as a user message holding one `tool_result` block with the
/// matching `tool_use_id`.  Error results carry `is_error=true` and an
/// `Error: `-prefixed text body.
pub(super) async fn prepare(
    executor: &dyn ToolExecutor,
    req: &mut MessagesRequest,
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
        match intercepted_tool(&tool.name) {
            Some(kind) => {
                stripped.insert(tool.name.clone(), kind);
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

    let answered: HashSet<String> = req
        .messages
        .iter()
        .flat_map(blocks_of)
        .filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
            _ => None,
        })
        .collect();

    let mut pending: Vec<(String, HandlerKind, String)> = Vec::new();
    for msg in &req.messages {
        if !msg.is_assistant() {
            continue;
        }
        for block in blocks_of(msg) {
            if let ContentBlock::ToolUse { id, name, input } = block {
                if answered.contains(id) {
                    continue;
                }
                if let Some(kind) = stripped.get(name) {
                    let arguments = input.to_string();
                    pending.push((id.clone(), *kind, arguments));
                }
            }
        }
    }

    let mut injected = false;
    for (id, kind, arguments) in pending {
        let result = executor.execute(kind, &id, &arguments).await;
        let text = if result.is_error {
            format!("Error: {}", result.content)
        } else {
            result.content
        };
        req.messages.push(MessageParam::tool_result(result.call_id, text, result.is_error));
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

fn blocks_of(msg: &MessageParam) -> &[ContentBlock] {
    match &msg.content {
        MessageContent::Blocks(blocks) => blocks,
        MessageContent::Text(_) => &[],
    }
}

/// True when `tool_choice` pins a stripped tool (`{"type": "tool",
/// "name": …}`).  `auto`/`any` modes pin no name and are left alone.
fn choice_references_only(
    choice: &Option<Value>,
    stripped: &HashMap<String, HandlerKind>,
) -> bool {
    let Some(choice) = choice else { return false };
    choice
        .get("name")
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
                    ToolResult::ok(call_id, json!({"results": []}).to_string())
                }
                HandlerKind::Fetch => ToolResult::ok(call_id, "page text"),
            }
        }
    }

    fn request(raw: Value) -> MessagesRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[tokio::test]
    async fn strips_tools_and_injects_tool_result_block() {
        let mut req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 1024,
            "messages": [
                {"role": "user", "content": "look this up"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "tu_1", "name": "web_search",
                     "input": {"query": "rust"}}
                ]}
            ],
            "tools": [{"name": "web_search"}],
            "tool_choice": {"type": "tool", "name": "web_search"}
        }));
        let outcome = prepare(&StubExecutor, &mut req).await;

        assert!(outcome.has_pre_injected_results);
        assert!(req.tools.is_none());
        assert!(req.tool_choice.is_none());

        let last = req.messages.last().unwrap();
        assert_eq!(last.role, "user");
        match &last.content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                match &blocks[0] {
                    ContentBlock::ToolResult { tool_use_id, is_error, .. } => {
                        assert_eq!(tool_use_id, "tu_1");
                        assert!(is_error.is_none());
                    }
                    other => panic!("expected tool_result, got {other:?}"),
                }
            }
            _ => panic!("expected block content"),
        }
    }

    #[tokio::test]
    async fn error_result_is_prefixed_and_flagged() {
        let mut req = request(json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "tu_1", "name": "web_search", "input": {}}
                ]}
            ],
            "tools": [{"name": "web_search"}]
        }));
        prepare(&StubExecutor, &mut req).await;
        let last = req.messages.last().unwrap();
        match &last.content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, is_error, .. } => {
                    assert_eq!(*is_error, Some(true));
                    let text = content.as_ref().unwrap().as_str().unwrap();
                    assert!(text.starts_with("Error: "), "got {text:?}");
                }
                other => panic!("expected tool_result, got {other:?}"),
            },
            _ => panic!("expected block content"),
        }
    }

    #[tokio::test]
    async fn answered_tool_use_is_skipped() {
        let mut req = request(json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "tu_1", "name": "web_search",
                     "input": {"query": "x"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "tu_1", "content": "done"}
                ]}
            ],
            "tools": [{"name": "web_search"}]
        }));
        let before = req.messages.len();
        let outcome = prepare(&StubExecutor, &mut req).await;
        assert!(!outcome.has_pre_injected_results);
        assert_eq!(req.messages.len(), before);
    }

    #[tokio::test]
    async fn mixed_tools_keep_forwarded_declarations() {
        let mut req = request(json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "q"}],
            "tools": [
                {"name": "get_weather", "input_schema": {"type": "object"}},
                {"name": "read_url"}
            ]
        }));
        let outcome = prepare(&StubExecutor, &mut req).await;
        assert_eq!(outcome.stripped_tools, vec!["read_url".to_string()]);
        let tools = req.tools.as_ref().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_weather");
    }

    #[tokio::test]
    async fn auto_tool_choice_is_preserved() {
        let mut req = request(json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "q"}],
            "tools": [{"name": "web_search"}],
            "tool_choice": {"type": "auto"}
        }));
        prepare(&StubExecutor, &mut req).await;
        assert_eq!(req.tool_choice, Some(json!({"type": "auto"})));
    }

    #[tokio::test]
    async fn no_tools_is_identity() {
        let raw = json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let mut req = request(raw.clone());
        let outcome = prepare(&StubExecutor, &mut req).await;
        assert!(!outcome.has_pre_injected_results);
        assert_eq!(serde_json::to_value(&req).unwrap(), raw);
    }
}
