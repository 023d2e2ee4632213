//! Stream-response cache.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::indexer::Release;
use crate::triage::TriageDecision;

use super::{CacheWeight, FifoCache};

/// Bumped whenever the cached payload shape changes; mismatched
/// versions read as misses.
pub const RESPONSE_CACHE_VERSION: u32 = 3;

/// Default entry cap for the response cache.
const MAX_ENTRIES: usize = 1000;

/// A cached stream response plus the state needed to resume triage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub version: u32,
    pub stored_at: DateTime<Utc>,
    /// The assembled response payload as served.
    pub payload: serde_json::Value,
    /// Whether every evaluated candidate reached a final status.
    pub triage_complete: bool,
    /// Download URLs whose triage decisions are still pending.
    #[serde(default)]
    pub pending_urls: Vec<String>,
    /// Decision snapshot keyed by download URL.
    #[serde(default)]
    pub decisions: HashMap<String, TriageDecision>,
    /// The finalized, ordered release list.
    #[serde(default)]
    pub releases: Vec<Release>,
}

impl CacheWeight for CachedResponse {
    fn weight(&self) -> usize {
        // Estimated by serializing the whole entry, payload and meta.
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Response cache keyed by the canonical request JSON.
pub struct ResponseCache {
    cache: FifoCache<CachedResponse>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: FifoCache::new(
                Duration::from_secs(config.stream_ttl_minutes * 60),
                MAX_ENTRIES,
                (config.stream_max_size_mb as usize) * 1024 * 1024,
            ),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        self.cache
            .get(key)
            .filter(|entry| entry.version == RESPONSE_CACHE_VERSION)
    }

    pub fn insert(&self, key: String, response: CachedResponse) -> bool {
        self.cache.insert(key, response)
    }

    pub fn flush(&self) {
        self.cache.flush();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Build the canonical cache key for a stream request: type, id,
/// requested episode and the sorted extra query parameters.
pub fn response_cache_key(
    content_type: &str,
    id: &str,
    episode: Option<(u32, u32)>,
    query: &[(String, String)],
) -> String {
    let mut sorted: Vec<(String, String)> = query.to_vec();
    sorted.sort();

    serde_json::json!({
        "type": content_type,
        "id": id,
        "episode": episode.map(|(s, e)| format!("s{s:02}e{e:02}")),
        "query": sorted,
    })
    .to_string()
}
