// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Provider-shaped request and message types.
//!
//! The proxy manipulates two structurally distinct request payloads: the
//! OpenAI chat-completions shape and the Anthropic messages shape.  Both are
//! modelled with `serde` so that unknown fields survive a round trip through
//! the proxy unchanged (`#[serde(flatten)]` extras on the request structs).
//! The rest of the workspace reaches into them only through the narrow
//! accessors defined here.

pub mod anthropic;
pub mod openai;

pub use anthropic::{ContentBlock, MessageContent, MessageParam, MessagesRequest, ToolParam};
pub use openai::{
    ChatCompletionRequest, ChatContent, ChatMessage, ChatTool, ChatToolCall, FunctionCall,
    FunctionDef,
};
