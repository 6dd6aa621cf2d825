// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Web search for intercepted `web_search` calls.
//!
//! One handler fronts three backends (Brave, Google Custom Search,
//! DuckDuckGo).  Results are cached per query; a cache hit is re-capped to
//! the caller's `count` so one stored result set serves different counts.

mod brave;
mod duckduckgo;
mod google;

use std::sync::Arc;

use prism_config::{SearchApi, SearchSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CacheKind, ToolCache};
use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct SearchHandler {
    settings: SearchSettings,
    cache: Arc<ToolCache>,
    client: reqwest::Client,
}

impl SearchHandler {
    pub fn new(settings: SearchSettings, cache: Arc<ToolCache>) -> Result<Self, ToolError> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:122.0) Gecko/20100101 Firefox/122.0");
        if let Some(proxy_url) = &settings.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ToolError::Config(format!("invalid proxy_url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ToolError::Config(format!("building search client: {e}")))?;
        Ok(Self { settings, cache, client })
    }

    /// Run `query` against the configured backend, returning at most `count`
    /// results (`count` is clamped to `1..=max_results`).
    pub async fn search(
        &self,
        query: &str,
        count: usize,
    ) -> Result<Vec<SearchResult>, ToolError> {
        if query.trim().is_empty() {
            return Err(ToolError::InvalidInput("query must not be empty".into()));
        }
        let count = count.clamp(1, self.settings.max_results);

        let key = ToolCache::search_key(query);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(mut results) = serde_json::from_str::<Vec<SearchResult>>(&cached) {
                results.truncate(count);
                return Ok(results);
            }
        }

        debug!(query, count, api = ?self.settings.api, "dispatching search");
        let proxy = self.settings.proxy_url.as_deref();
        let mut results = match self.settings.api {
            SearchApi::Brave => {
                let api_key = self
                    .settings
                    .api_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        ToolError::Config("brave search requires search.api_key".into())
                    })?;
                brave::search(&self.client, api_key, query, self.settings.max_results, proxy)
                    .await?
            }
            SearchApi::Google => {
                let api_key = self
                    .settings
                    .api_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        ToolError::Config("google search requires search.api_key".into())
                    })?;
                let cx = self
                    .settings
                    .google_cx
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        ToolError::Config("google search requires search.google_cx".into())
                    })?;
                google::search(&self.client, api_key, cx, query, self.settings.max_results, proxy)
                    .await?
            }
            SearchApi::DuckDuckGo => {
                duckduckgo::search(&self.client, query, self.settings.max_results, proxy).await?
            }
        };

        if let Ok(serialized) = serde_json::to_string(&results) {
            self.cache.set(key, serialized, CacheKind::Search);
        }
        results.truncate(count);
        Ok(results)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
