//! Verified-NZB payload cache.

use std::time::Duration;

use crate::config::CacheConfig;

use super::{CacheWeight, FifoCache};

/// Entry cap; the byte budget is the real limit for NZB payloads.
const MAX_ENTRIES: usize = 500;

/// A verified NZB body plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedNzb {
    pub body: Vec<u8>,
    pub title: String,
    pub declared_size: u64,
    pub filename: String,
}

impl CacheWeight for VerifiedNzb {
    fn weight(&self) -> usize {
        self.body.len() + self.title.len() + self.filename.len()
    }
}

/// Verified NZBs keyed by download URL, so playback can upload the
/// exact bytes triage approved instead of re-downloading.
pub struct VerifiedNzbCache {
    cache: FifoCache<VerifiedNzb>,
}

impl VerifiedNzbCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: FifoCache::new(
                Duration::from_secs(config.verified_nzb_ttl_minutes * 60),
                MAX_ENTRIES,
                (config.verified_nzb_max_size_mb as usize) * 1024 * 1024,
            ),
        }
    }

    pub fn get(&self, download_url: &str) -> Option<VerifiedNzb> {
        self.cache.get(download_url)
    }

    pub fn insert(&self, download_url: String, nzb: VerifiedNzb) -> bool {
        self.cache.insert(download_url, nzb)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CacheConfig {
        CacheConfig {
            stream_ttl_minutes: 60,
            stream_max_size_mb: 1,
            verified_nzb_ttl_minutes: 60,
            verified_nzb_max_size_mb: 1,
            mount_ttl_minutes: 30,
        }
    }

    fn nzb(body: &[u8]) -> VerifiedNzb {
        VerifiedNzb {
            body: body.to_vec(),
            title: "Movie.2023.1080p".to_string(),
            declared_size: body.len() as u64,
            filename: "movie.nzb".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let cache = VerifiedNzbCache::new(&test_config());
        assert!(cache.insert("https://x/get/1".into(), nzb(b"<nzb/>")));
        let hit = cache.get("https://x/get/1").unwrap();
        assert_eq!(hit.body, b"<nzb/>");
        assert_eq!(hit.filename, "movie.nzb");
    }

    #[test]
    fn test_byte_budget_fifo() {
        let cache = VerifiedNzbCache::new(&test_config());
        // Three ~400 KiB bodies against a 1 MiB budget: first evicted.
        let big = vec![0u8; 400 * 1024];
        cache.insert("u1".into(), nzb(&big));
        cache.insert("u2".into(), nzb(&big));
        cache.insert("u3".into(), nzb(&big));
        assert!(cache.get("u1").is_none());
        assert!(cache.get("u2").is_some());
        assert!(cache.get("u3").is_some());
    }

    #[test]
    fn test_oversized_body_rejected() {
        let cache = VerifiedNzbCache::new(&test_config());
        let too_big = vec![0u8; 2 * 1024 * 1024];
        assert!(!cache.insert("u1".into(), nzb(&too_big)));
        assert!(cache.is_empty());
    }
}
