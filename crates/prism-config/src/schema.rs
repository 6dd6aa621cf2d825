// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `false`, so fields
/// that should be enabled unless explicitly disabled need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub intercept: InterceptSettings,
    #[serde(default)]
    pub compact: CompactSettings,
    #[serde(default)]
    pub guardrails: GuardrailsSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

/// Shared tool-result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of entries before LRU eviction kicks in.
    #[serde(default = "CacheSettings::default_max_size")]
    pub max_size: usize,
    /// Time-to-live for search results, e.g. `"1h"`.
    #[serde(default = "CacheSettings::default_search_ttl", with = "duration_str")]
    pub search_ttl: Duration,
    /// Time-to-live for fetched pages, e.g. `"24h"`.
    #[serde(default = "CacheSettings::default_fetch_ttl", with = "duration_str")]
    pub fetch_ttl: Duration,
}

impl CacheSettings {
    fn default_max_size() -> usize {
        1000
    }
    fn default_search_ttl() -> Duration {
        Duration::from_secs(60 * 60)
    }
    fn default_fetch_ttl() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: Self::default_max_size(),
            search_ttl: Self::default_search_ttl(),
            fetch_ttl: Self::default_fetch_ttl(),
        }
    }
}

/// Which search backend serves intercepted `web_search` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchApi {
    Brave,
    Google,
    #[default]
    DuckDuckGo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub api: SearchApi,
    /// Required for `brave` and `google`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Google Custom Search engine id; required when `api = google`.
    #[serde(default)]
    pub google_cx: Option<String>,
    /// Upper bound on results per request; `count` is clamped to this.
    #[serde(default = "SearchSettings::default_max_results")]
    pub max_results: usize,
    /// Optional outbound proxy, e.g. `socks5://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Internal deadline for one search request.
    #[serde(default = "SearchSettings::default_timeout", with = "duration_str")]
    pub timeout: Duration,
}

impl SearchSettings {
    fn default_max_results() -> usize {
        10
    }
    fn default_timeout() -> Duration {
        Duration::from_secs(20)
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api: SearchApi::default(),
            api_key: None,
            google_cx: None,
            max_results: Self::default_max_results(),
            proxy_url: None,
            timeout: Self::default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Maximum response body size in bytes; a body that reaches this bound
    /// is rejected.
    #[serde(default = "FetchSettings::default_max_size")]
    pub max_size: usize,
    #[serde(default = "FetchSettings::default_timeout", with = "duration_str")]
    pub timeout: Duration,
    #[serde(default = "FetchSettings::default_max_url_length")]
    pub max_url_length: usize,
    #[serde(default = "FetchSettings::default_user_agent")]
    pub user_agent: String,
}

impl FetchSettings {
    fn default_max_size() -> usize {
        1024 * 1024
    }
    fn default_timeout() -> Duration {
        Duration::from_secs(30)
    }
    fn default_max_url_length() -> usize {
        2000
    }
    fn default_user_agent() -> String {
        "Mozilla/5.0 (X11; Linux x86_64; rv:122.0) Gecko/20100101 Firefox/122.0".into()
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_size: Self::default_max_size(),
            timeout: Self::default_timeout(),
            max_url_length: Self::default_max_url_length(),
            user_agent: Self::default_user_agent(),
        }
    }
}

/// Per-provider toggles for in-flight tool interception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptSettings {
    #[serde(default = "default_true")]
    pub openai: bool,
    #[serde(default = "default_true")]
    pub anthropic: bool,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self { openai: true, anthropic: true }
    }
}

/// Smart-compact transformer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of most-recent conversation rounds whose thinking content is
    /// preserved.  Minimum 1 (the current round is always kept).
    #[serde(default = "CompactSettings::default_keep_recent_rounds")]
    pub keep_recent_rounds: usize,
}

impl CompactSettings {
    fn default_keep_recent_rounds() -> usize {
        1
    }
}

impl Default for CompactSettings {
    fn default() -> Self {
        Self { enabled: true, keep_recent_rounds: Self::default_keep_recent_rounds() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailsSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Path to the rules document (YAML or JSON).
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Base directory for the identity store.  Defaults to
    /// `~/.local/share/prism` (or the platform equivalent).
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default = "AuthSettings::default_issuer")]
    pub issuer: String,
    /// Environment variable holding the HS256 signing secret.  Prefer this
    /// over `secret` in version-controlled config files.
    #[serde(default)]
    pub secret_env: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "AuthSettings::default_access_ttl", with = "duration_str")]
    pub access_ttl: Duration,
    #[serde(default = "AuthSettings::default_refresh_ttl", with = "duration_str")]
    pub refresh_ttl: Duration,
}

impl AuthSettings {
    fn default_issuer() -> String {
        "prism".into()
    }
    fn default_access_ttl() -> Duration {
        Duration::from_secs(15 * 60)
    }
    fn default_refresh_ttl() -> Duration {
        Duration::from_secs(7 * 24 * 60 * 60)
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            base_dir: None,
            issuer: Self::default_issuer(),
            secret_env: None,
            secret: None,
            access_ttl: Self::default_access_ttl(),
            refresh_ttl: Self::default_refresh_ttl(),
        }
    }
}

/// Serde helper: durations as humantime strings (`"30s"`, `"1h"`, `"7d"`).
pub mod duration_str {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_documented_limits() {
        let c = Config::default();
        assert_eq!(c.cache.max_size, 1000);
        assert_eq!(c.cache.search_ttl, Duration::from_secs(3600));
        assert_eq!(c.cache.fetch_ttl, Duration::from_secs(86400));
        assert_eq!(c.search.max_results, 10);
        assert_eq!(c.fetch.max_size, 1024 * 1024);
        assert_eq!(c.fetch.max_url_length, 2000);
        assert_eq!(c.compact.keep_recent_rounds, 1);
    }

    #[test]
    fn durations_parse_from_humantime_strings() {
        let c: CacheSettings =
            serde_yaml::from_str("max_size: 5\nsearch_ttl: 2h\nfetch_ttl: 30m").unwrap();
        assert_eq!(c.max_size, 5);
        assert_eq!(c.search_ttl, Duration::from_secs(7200));
        assert_eq!(c.fetch_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn search_api_parses_lowercase_names() {
        let s: SearchSettings = serde_yaml::from_str("api: brave").unwrap();
        assert_eq!(s.api, SearchApi::Brave);
        let s: SearchSettings = serde_yaml::from_str("api: duckduckgo").unwrap();
        assert_eq!(s.api, SearchApi::DuckDuckGo);
    }

    #[test]
    fn intercept_defaults_to_enabled_for_both_shapes() {
        let i = InterceptSettings::default();
        assert!(i.openai);
        assert!(i.anthropic);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let c: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(c.search.max_results, 10);
        assert!(c.auth.base_dir.is_none());
        assert_eq!(c.auth.access_ttl, Duration::from_secs(900));
        assert_eq!(c.auth.refresh_ttl, Duration::from_secs(604800));
    }
}
