// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An Anthropic-shaped messages request.
///
/// As with the OpenAI shape, only the rewritten fields are typed and the
/// remainder rides along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<MessageParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolParam>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A user or assistant message whose content is either a bare string or a
/// list of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageParam {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Typed content blocks.  `Thinking` and `RedactedThinking` carry the model's
/// chain-of-thought; `ToolUse`/`ToolResult` bind a tool call to its answer
/// through `id`/`tool_use_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    Image {
        source: Value,
    },
}

/// A tool declaration in the request's `tools` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl MessageParam {
    /// A user-role message that carries no `tool_result` blocks.
    pub fn is_pure_user(&self) -> bool {
        self.role == "user" && !self.has_tool_result()
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    pub fn has_tool_result(&self) -> bool {
        match &self.content {
            MessageContent::Text(_) => false,
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. })),
        }
    }

    pub fn has_thinking(&self) -> bool {
        match &self.content {
            MessageContent::Text(_) => false,
            MessageContent::Blocks(blocks) => blocks.iter().any(|b| {
                matches!(
                    b,
                    ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. }
                )
            }),
        }
    }

    /// Remove thinking and redacted-thinking blocks, preserving the order of
    /// everything else.  String content is untouched.
    pub fn strip_thinking(&mut self) {
        if let MessageContent::Blocks(blocks) = &mut self.content {
            blocks.retain(|b| {
                !matches!(
                    b,
                    ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. }
                )
            });
        }
    }

    /// Construct a user message holding a single `tool_result` block.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: Some(Value::String(content.into())),
                is_error: if is_error { Some(true) } else { None },
            }]),
        }
    }

    /// Plain-text view across string content and text blocks.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant_with(blocks: Vec<ContentBlock>) -> MessageParam {
        MessageParam { role: "assistant".into(), content: MessageContent::Blocks(blocks) }
    }

    #[test]
    fn thinking_block_parses_from_wire_form() {
        let raw = json!({
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "let me see", "signature": "sig"},
                {"type": "text", "text": "answer"}
            ]
        });
        let msg: MessageParam = serde_json::from_value(raw).unwrap();
        assert!(msg.has_thinking());
        assert_eq!(msg.text(), "answer");
    }

    #[test]
    fn strip_thinking_removes_both_variants_in_order() {
        let mut msg = assistant_with(vec![
            ContentBlock::Thinking { thinking: "t".into(), signature: None },
            ContentBlock::Text { text: "a".into() },
            ContentBlock::RedactedThinking { data: "r".into() },
            ContentBlock::Text { text: "b".into() },
        ]);
        msg.strip_thinking();
        match &msg.content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == "a"));
                assert!(matches!(&blocks[1], ContentBlock::Text { text } if text == "b"));
            }
            _ => panic!("expected block content"),
        }
    }

    #[test]
    fn strip_thinking_on_string_content_is_noop() {
        let mut msg =
            MessageParam { role: "assistant".into(), content: MessageContent::Text("x".into()) };
        msg.strip_thinking();
        assert_eq!(msg.text(), "x");
    }

    #[test]
    fn user_with_tool_result_is_not_pure() {
        let msg = MessageParam::tool_result("tu_1", "out", false);
        assert_eq!(msg.role, "user");
        assert!(msg.has_tool_result());
        assert!(!msg.is_pure_user());
    }

    #[test]
    fn plain_user_is_pure() {
        let msg = MessageParam { role: "user".into(), content: MessageContent::Text("q".into()) };
        assert!(msg.is_pure_user());
    }

    #[test]
    fn tool_result_error_flag_serializes_only_when_set() {
        let ok = MessageParam::tool_result("id", "fine", false);
        let v = serde_json::to_value(&ok).unwrap();
        assert!(v["content"][0].get("is_error").is_none());

        let err = MessageParam::tool_result("id", "boom", true);
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["content"][0]["is_error"], json!(true));
    }

    #[test]
    fn request_round_trips_unknown_fields() {
        let raw = json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "hi"}],
            "metadata": {"user_id": "u1"}
        });
        let req: MessagesRequest = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back["max_tokens"], json!(1024));
        assert_eq!(back["metadata"]["user_id"], json!("u1"));
    }

    #[test]
    fn tool_use_block_round_trips() {
        let raw = json!({
            "role": "assistant",
            "content": [{"type": "tool_use", "id": "tu_1", "name": "web_search",
                         "input": {"query": "rust"}}]
        });
        let msg: MessageParam = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
    }
}
