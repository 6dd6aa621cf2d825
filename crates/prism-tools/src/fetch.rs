// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! URL fetcher for intercepted `web_fetch` calls.
//!
//! Order of checks: URL validation, SSRF guard, then a size-bounded GET with
//! readability-style main-content extraction.  Hosts resolving into private
//! or link-local ranges are rejected before any connection is attempted; a
//! DNS failure is non-blocking because the connect itself is the final
//! guard.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use prism_config::FetchSettings;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::cache::{CacheKind, ToolCache};
use crate::error::ToolError;

const DNS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FetchHandler {
    settings: FetchSettings,
    cache: Arc<ToolCache>,
    client: reqwest::Client,
}

impl FetchHandler {
    pub fn new(settings: FetchSettings, cache: Arc<ToolCache>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ToolError::Config(format!("building fetch client: {e}")))?;
        Ok(Self { settings, cache, client })
    }

    /// Fetch `url` and return the extracted main content as plain text.
    pub async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        let parsed = validate_url(url, self.settings.max_url_length)?;

        let key = ToolCache::fetch_key(url);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        self.ssrf_guard(&parsed).await?;

        debug!(url, "fetching page");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest(e, None))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ToolError::Network(format!("unexpected status {status} for {url}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !content_type.contains("text/html") {
            return Err(ToolError::UnsupportedContentType(format!(
                "{url} returned {content_type:?}, only text/html is fetched"
            )));
        }

        let html = self.read_bounded(response, url).await?;
        let text = extract_main_content(&html);

        self.cache.set(key, text.clone(), CacheKind::Fetch);
        Ok(text)
    }

    /// Stream the body up to the configured bound.  Reaching the bound is a
    /// failure — the bound is inclusive, a body of exactly `max_size` bytes
    /// is rejected.
    async fn read_bounded(
        &self,
        mut response: reqwest::Response,
        url: &str,
    ) -> Result<String, ToolError> {
        let max = self.settings.max_size;
        let mut body: Vec<u8> = Vec::with_capacity(8 * 1024);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::from_reqwest(e, None))?
        {
            body.extend_from_slice(&chunk);
            if body.len() >= max {
                return Err(ToolError::ContentTooLarge(format!(
                    "{url} exceeds the {max}-byte fetch limit"
                )));
            }
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Resolve the host and reject private, loopback, and link-local ranges.
    async fn ssrf_guard(&self, url: &Url) -> Result<(), ToolError> {
        let host = url.host().ok_or_else(|| {
            ToolError::InvalidInput(format!("{url} has no host"))
        })?;

        let addrs: Vec<IpAddr> = match host {
            Host::Ipv4(ip) => vec![IpAddr::V4(ip)],
            Host::Ipv6(ip) => vec![IpAddr::V6(ip)],
            Host::Domain(name) => {
                let port = url.port_or_known_default().unwrap_or(443);
                let lookup =
                    tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((name, port))).await;
                match lookup {
                    Ok(Ok(resolved)) => resolved.map(|sa| sa.ip()).collect(),
                    // Resolution failure is non-blocking; the connection
                    // attempt is the final guard.
                    Ok(Err(e)) => {
                        debug!(host = name, error = %e, "DNS resolution failed, continuing");
                        vec![]
                    }
                    Err(_) => {
                        debug!(host = name, "DNS resolution timed out, continuing");
                        vec![]
                    }
                }
            }
        };

        for addr in addrs {
            if is_private_addr(addr) {
                warn!(%url, %addr, "SSRF guard rejected private address");
                return Err(ToolError::SsrfBlocked(format!(
                    "{url} resolves to the private address {addr}"
                )));
            }
        }
        Ok(())
    }
}

/// Syntactic URL checks: bounded length, http(s) scheme, non-empty host.
fn validate_url(url: &str, max_len: usize) -> Result<Url, ToolError> {
    if url.is_empty() {
        return Err(ToolError::InvalidInput("url must not be empty".into()));
    }
    if url.len() > max_len {
        return Err(ToolError::InvalidInput(format!(
            "url length {} exceeds the {max_len}-character limit",
            url.len()
        )));
    }
    let parsed =
        Url::parse(url).map_err(|e| ToolError::InvalidInput(format!("invalid url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ToolError::InvalidInput(format!(
                "unsupported scheme {other:?}, only http and https are fetched"
            )))
        }
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ToolError::InvalidInput("url has no host".into()));
    }
    Ok(parsed)
}

/// Private, loopback, link-local, and unique-local ranges.
fn is_private_addr(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let [a, b, _, _] = v4.octets();
            a == 127                        // 127/8
                || a == 10                  // 10/8
                || (a == 172 && (16..=31).contains(&b)) // 172.16/12
                || (a == 192 && b == 168)   // 192.168/16
                || (a == 169 && b == 254)   // 169.254/16
        }
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            v6.is_loopback()                       // ::1/128
                || (seg[0] & 0xffc0) == 0xfe80     // fe80::/10
                || (seg[0] & 0xfe00) == 0xfc00     // fc00::/7
                || v6.to_ipv4_mapped().map(|m| is_private_addr(IpAddr::V4(m))).unwrap_or(false)
        }
    }
}

/// Readability-style extraction: prefer the `<article>` or `<main>` element
/// when present, drop script and style blocks, and convert the rest to plain
/// text.
fn extract_main_content(html: &str) -> String {
    let scoped = slice_element(html, "article")
        .or_else(|| slice_element(html, "main"))
        .unwrap_or(html);
    let cleaned = strip_element(scoped, "script");
    let cleaned = strip_element(&cleaned, "style");
    html2text::from_read(cleaned.as_bytes(), 100).trim().to_string()
}

/// Return the inner slice of the first `<tag ...>...</tag>` pair, if any.
fn slice_element<'a>(html: &'a str, tag: &str) -> Option<&'a str> {
    let lower = html.to_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let start_tag = lower.find(&open)?;
    let start = lower[start_tag..].find('>').map(|p| start_tag + p + 1)?;
    let end = lower[start..].find(&close).map(|p| start + p)?;
    Some(&html[start..end])
}

/// Remove every `<tag ...>...</tag>` region from `html`.
fn strip_element(html: &str, tag: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    loop {
        let lower = rest.to_lowercase();
        match lower.find(&open) {
            Some(start) => {
                out.push_str(&rest[..start]);
                match lower[start..].find(&close) {
                    Some(rel_end) => {
                        rest = &rest[start + rel_end + close.len()..];
                    }
                    None => break, // unterminated: drop the remainder
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
