// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

use super::SearchResult;
use crate::error::ToolError;

/// Query the Brave web-search API.
pub(super) async fn search(
    client: &reqwest::Client,
    api_key: &str,
    query: &str,
    count: usize,
    proxy_url: Option<&str>,
) -> Result<Vec<SearchResult>, ToolError> {
    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={count}",
        urlencode(query)
    );

    let resp = client
        .get(&url)
        .header("Accept", "application/json")
        .header("Accept-Encoding", "gzip")
        .header("X-Subscription-Token", api_key)
        .send()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;

    if !resp.status().is_success() {
        return Err(ToolError::Network(format!(
            "Brave API returned status {}",
            resp.status()
        )));
    }

    let json: Value = resp
        .json()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;

    let rows = json
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[]);

    Ok(rows
        .iter()
        .take(count)
        .map(|r| SearchResult {
            title: str_field(r, "title"),
            url: str_field(r, "url"),
            snippet: str_field(r, "description"),
        })
        .collect())
}

fn str_field(row: &Value, key: &str) -> String {
    row.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

/// Percent-encode a query string for a URL query component.
pub(super) fn urlencode(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            ' ' => encoded.push('+'),
            c => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_passes_unreserved_chars() {
        assert_eq!(urlencode("rust-lang_1.0~ok"), "rust-lang_1.0~ok");
    }

    #[test]
    fn urlencode_spaces_become_plus() {
        assert_eq!(urlencode("hello world"), "hello+world");
    }

    #[test]
    fn urlencode_escapes_reserved_chars() {
        assert_eq!(urlencode("a&b=c"), "a%26b%3Dc");
    }

    #[test]
    fn urlencode_handles_multibyte() {
        assert_eq!(urlencode("å"), "%C3%A5");
    }
}
