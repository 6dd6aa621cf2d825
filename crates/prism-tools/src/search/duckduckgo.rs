// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! DuckDuckGo backend.  No API key: the Instant-Answer JSON surface is tried
//! first, and when it yields no usable rows the HTML endpoint is scraped as
//! a fallback.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::brave::urlencode;
use super::SearchResult;
use crate::error::ToolError;

pub(super) async fn search(
    client: &reqwest::Client,
    query: &str,
    count: usize,
    proxy_url: Option<&str>,
) -> Result<Vec<SearchResult>, ToolError> {
    let results = instant_answer(client, query, count, proxy_url).await?;
    if !results.is_empty() {
        return Ok(results);
    }
    debug!(query, "instant answer empty, falling back to HTML scrape");
    html_fallback(client, query, count, proxy_url).await
}

// ── Instant-Answer JSON ───────────────────────────────────────────────────────

/// Assemble results in priority order: the primary abstract (when present),
/// then related topics, then secondary results.
async fn instant_answer(
    client: &reqwest::Client,
    query: &str,
    count: usize,
    proxy_url: Option<&str>,
) -> Result<Vec<SearchResult>, ToolError> {
    let url = format!(
        "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
        urlencode(query)
    );
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;
    if !resp.status().is_success() {
        return Err(ToolError::Network(format!(
            "DuckDuckGo API returned status {}",
            resp.status()
        )));
    }
    let json: Value = resp
        .json()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;

    let mut results = Vec::new();

    let abstract_text = json.get("AbstractText").and_then(|v| v.as_str()).unwrap_or("");
    let abstract_url = json.get("AbstractURL").and_then(|v| v.as_str()).unwrap_or("");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = json.get("Heading").and_then(|v| v.as_str()).unwrap_or(query);
        results.push(SearchResult {
            title: heading.to_string(),
            url: abstract_url.to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(topics) = json.get("RelatedTopics").and_then(|v| v.as_array()) {
        collect_topics(topics, &mut results, count);
    }
    if results.len() < count {
        if let Some(rows) = json.get("Results").and_then(|v| v.as_array()) {
            collect_topics(rows, &mut results, count);
        }
    }

    results.truncate(count);
    Ok(results)
}

/// Flatten topic rows into results.  Category entries nest their rows under
/// `Topics`.
fn collect_topics(rows: &[Value], out: &mut Vec<SearchResult>, count: usize) {
    for row in rows {
        if out.len() >= count {
            return;
        }
        if let Some(nested) = row.get("Topics").and_then(|v| v.as_array()) {
            collect_topics(nested, out, count);
            continue;
        }
        let text = row.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = row.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        // The topic text is "Title - description"; keep the lead as title.
        let title = text.split(" - ").next().unwrap_or(text);
        out.push(SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

// ── HTML fallback ─────────────────────────────────────────────────────────────

async fn html_fallback(
    client: &reqwest::Client,
    query: &str,
    count: usize,
    proxy_url: Option<&str>,
) -> Result<Vec<SearchResult>, ToolError> {
    let url = format!("https://html.duckduckgo.com/html/?q={}", urlencode(query));
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;
    if !resp.status().is_success() {
        return Err(ToolError::Network(format!(
            "DuckDuckGo HTML endpoint returned status {}",
            resp.status()
        )));
    }
    let html = resp
        .text()
        .await
        .map_err(|e| ToolError::from_reqwest(e, proxy_url))?;
    Ok(parse_result_page(&html, count))
}

/// Scrape `result__a` anchors (title + link) and pair them with the
/// `result__snippet` element of the same result block.
fn parse_result_page(html: &str, count: usize) -> Vec<SearchResult> {
    // Anchors and snippets appear once per result block, in document order.
    let anchor_re = Regex::new(
        r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#,
    )
    .expect("static regex");
    let snippet_re = Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</a>"#)
        .expect("static regex");

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| clean_fragment(c.get(1).map(|m| m.as_str()).unwrap_or("")))
        .collect();

    anchor_re
        .captures_iter(html)
        .take(count)
        .enumerate()
        .map(|(i, c)| SearchResult {
            title: clean_fragment(c.get(2).map(|m| m.as_str()).unwrap_or("")),
            url: resolve_redirect(c.get(1).map(|m| m.as_str()).unwrap_or("")),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|r| !r.title.is_empty() && !r.url.is_empty())
        .collect()
}

/// DuckDuckGo wraps outbound links in `/l/?uddg=<encoded>` (older markup
/// used `u=`).  Unwrap to the real destination when the parameter is
/// present.
fn resolve_redirect(href: &str) -> String {
    let query = match href.split_once('?') {
        Some((_, q)) => q,
        None => return normalize_scheme(href),
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("uddg=").or_else(|| pair.strip_prefix("u=")) {
            return percent_decode(value);
        }
    }
    normalize_scheme(href)
}

fn normalize_scheme(href: &str) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        href.to_string()
    }
}

/// Strip markup from a scraped fragment: break tags become spaces, all other
/// tags are dropped, and the five common entities are decoded.
fn clean_fragment(fragment: &str) -> String {
    let brs = Regex::new(r"(?i)<br\s*/?>").expect("static regex");
    let tags = Regex::new(r"<[^>]+>").expect("static regex");
    let text = brs.replace_all(fragment, " ");
    let text = tags.replace_all(&text, "");
    decode_entities(&text).trim().to_string()
}

/// Decode the entities DuckDuckGo's HTML surface actually emits.
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#x27;", "'")
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(h), Some(l)) => {
                        out.push((h * 16 + l) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn abstract_has_priority_over_topics() {
        let mut out = Vec::new();
        let json = json!({
            "AbstractText": "Rust is a language.",
            "AbstractURL": "https://rust-lang.org",
            "Heading": "Rust",
            "RelatedTopics": [
                {"Text": "Cargo - build tool", "FirstURL": "https://doc.rust-lang.org/cargo"}
            ]
        });
        let abstract_text = json["AbstractText"].as_str().unwrap();
        let abstract_url = json["AbstractURL"].as_str().unwrap();
        out.push(SearchResult {
            title: json["Heading"].as_str().unwrap().into(),
            url: abstract_url.into(),
            snippet: abstract_text.into(),
        });
        collect_topics(json["RelatedTopics"].as_array().unwrap(), &mut out, 10);
        assert_eq!(out[0].url, "https://rust-lang.org");
        assert_eq!(out[1].title, "Cargo");
    }

    #[test]
    fn nested_topic_categories_are_flattened() {
        let rows = json!([
            {"Name": "Category", "Topics": [
                {"Text": "Inner - row", "FirstURL": "https://a.example"},
                {"Text": "Other - row", "FirstURL": "https://b.example"}
            ]}
        ]);
        let mut out = Vec::new();
        collect_topics(rows.as_array().unwrap(), &mut out, 10);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://a.example");
    }

    #[test]
    fn collect_topics_respects_count() {
        let rows = json!([
            {"Text": "A - x", "FirstURL": "https://a"},
            {"Text": "B - y", "FirstURL": "https://b"},
            {"Text": "C - z", "FirstURL": "https://c"}
        ]);
        let mut out = Vec::new();
        collect_topics(rows.as_array().unwrap(), &mut out, 2);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn redirect_wrapper_is_unwrapped() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust%2Dlang.org%2F&rut=abc";
        assert_eq!(resolve_redirect(href), "https://www.rust-lang.org/");
    }

    #[test]
    fn legacy_u_parameter_is_unwrapped() {
        let href = "/l/?u=https%3A%2F%2Fexample.com%2Fpage";
        assert_eq!(resolve_redirect(href), "https://example.com/page");
    }

    #[test]
    fn plain_href_passes_through_with_scheme() {
        assert_eq!(resolve_redirect("//example.com/x"), "https://example.com/x");
        assert_eq!(resolve_redirect("https://example.com/x"), "https://example.com/x");
    }

    #[test]
    fn entities_and_break_tags_are_decoded() {
        let fragment = "Tom &amp; Jerry<br>&quot;cartoon&quot; &lt;classic&gt;";
        assert_eq!(clean_fragment(fragment), "Tom & Jerry \"cartoon\" <classic>");
    }

    #[test]
    fn markup_is_stripped_from_titles() {
        assert_eq!(clean_fragment("The <b>Rust</b> Book"), "The Rust Book");
    }

    #[test]
    fn result_page_is_parsed_in_document_order() {
        let html = r##"
            <div class="result">
              <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Ffirst.example%2F">First <b>hit</b></a>
              <a class="result__snippet" href="#">Snippet one</a>
            </div>
            <div class="result">
              <a rel="nofollow" class="result__a" href="https://second.example/">Second</a>
              <a class="result__snippet" href="#">Snippet two</a>
            </div>
        "##;
        let results = parse_result_page(html, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "First hit");
        assert_eq!(results[0].url, "https://first.example/");
        assert_eq!(results[1].title, "Second");
    }

    #[test]
    fn result_page_respects_count() {
        let html = r#"
            <a class="result__a" href="https://a/">A</a>
            <a class="result__a" href="https://b/">B</a>
            <a class="result__a" href="https://c/">C</a>
        "#;
        assert_eq!(parse_result_page(html, 2).len(), 2);
    }

    #[test]
    fn percent_decode_handles_plus_and_escapes() {
        assert_eq!(percent_decode("a+b%20c%2Fd"), "a b c/d");
    }
}
