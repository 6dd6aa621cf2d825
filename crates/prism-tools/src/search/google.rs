// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

use super::brave::urlencode;
use super::SearchResult;
use crate::error::ToolError;

/// Query the Google Custom Search JSON API.
///
/// `num` is capped at 10 by the API itself, so the effective result count is
/// `min(count, 10)`.
pub(super) async fn search(
    client: &reqwest::Client,
    api_key: &str,
    cx: &str,
    query: &str,
    count: usize,
    proxy_url: Option<&str>,
) -> Result<Vec<SearchResult>, ToolError> {
    let url = format!(
        "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}&num={}",
        urlencode(api_key),
        urlencode(cx),
        urlencode(query),
        count.min(10)
    );

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;

    if !resp.status().is_success() {
        return Err(ToolError::Network(format!(
            "Google Custom Search returned status {}",
            resp.status()
        )));
    }

    let json: Value = resp
        .json()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;

    let items = json
        .get("items")
        .and_then(|i| i.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[]);

    Ok(items
        .iter()
        .take(count)
        .map(|item| SearchResult {
            title: str_field(item, "title"),
            url: str_field(item, "link"),
            snippet: str_field(item, "snippet"),
        })
        .collect())
}

fn str_field(row: &Value, key: &str) -> String {
    row.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}
