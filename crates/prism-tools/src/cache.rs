// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::Instant;

use lru::LruCache;
use prism_config::CacheSettings;
use sha2::{Digest, Sha256};
use tracing::debug;

/// What a cache entry holds; selects the TTL applied on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Search,
    Fetch,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
    kind: CacheKind,
}

/// Shared tool-result cache: bounded LRU with a per-kind TTL.
///
/// The cache is the only mutable structure shared across request tasks, so
/// it sits behind a readers-writer lock.  `get` takes the write half because
/// an LRU hit promotes the entry.  A poisoned lock degrades to a miss on
/// read and a dropped write — a lost cache entry is never an error.
pub struct ToolCache {
    inner: RwLock<LruCache<String, CacheEntry>>,
    settings: CacheSettings,
}

impl ToolCache {
    pub fn new(settings: CacheSettings) -> Self {
        let cap = NonZeroUsize::new(settings.max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { inner: RwLock::new(LruCache::new(cap)), settings }
    }

    /// Cache key for a search query.
    pub fn search_key(query: &str) -> String {
        hash_key("search:", query)
    }

    /// Cache key for a fetched URL.
    pub fn fetch_key(url: &str) -> String {
        hash_key("fetch:", url)
    }

    /// Look up `key`, returning the stored value on a fresh hit.  Expired
    /// entries are removed when observed.
    pub fn get(&self, key: &str) -> Option<String> {
        let Ok(mut guard) = self.inner.write() else {
            return None;
        };
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!(key, kind = ?entry.kind, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                guard.pop(key);
                debug!(key, "cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Insert `value` under `key` with the TTL configured for `kind`.
    /// The LRU bound evicts the least-recently-used entry when full.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, kind: CacheKind) {
        let ttl = match kind {
            CacheKind::Search => self.settings.search_ttl,
            CacheKind::Fetch => self.settings.fetch_ttl,
        };
        let Ok(mut guard) = self.inner.write() else {
            return;
        };
        guard.put(
            key.into(),
            CacheEntry { value: value.into(), expires_at: Instant::now() + ttl, kind },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_key(prefix: &str, input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
