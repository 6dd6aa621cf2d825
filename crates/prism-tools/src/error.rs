// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Failure kinds for search, fetch, and interception.
///
/// These never cross the proxy boundary as transport errors: the interceptor
/// converts every one of them into an `is_error` tool result so that each
/// issued tool call is answered.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request cancelled: {0}")]
    Cancelled(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("blocked by SSRF guard: {0}")]
    SsrfBlocked(String),

    #[error("content too large: {0}")]
    ContentTooLarge(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

impl ToolError {
    /// Classify a reqwest transport failure, appending a proxy hint when the
    /// failure pattern suggests blocked connectivity and no proxy is set.
    pub fn from_reqwest(err: reqwest::Error, proxy_url: Option<&str>) -> Self {
        let text = err.to_string();
        if err.is_timeout() {
            return Self::Timeout(with_proxy_hint(text, proxy_url));
        }
        Self::Network(with_proxy_hint(text, proxy_url))
    }
}

/// Patterns that usually mean the upstream is unreachable from this network
/// rather than misbehaving.
const PROXY_HINT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "no such host",
    "connection reset",
    "i/o timeout",
];

fn with_proxy_hint(text: String, proxy_url: Option<&str>) -> String {
    if proxy_url.is_some() {
        return text;
    }
    let lower = text.to_lowercase();
    if PROXY_HINT_PATTERNS.iter().any(|p| lower.contains(p)) {
        format!("{text} (the endpoint may be unreachable from this network; consider setting search.proxy_url)")
    } else {
        text
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
