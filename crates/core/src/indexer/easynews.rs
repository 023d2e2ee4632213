//! Easynews search backend.
//!
//! Easynews is a paid provider with a proprietary JSON search API and a
//! form-post NZB builder. Search results carry no download URL; instead
//! each release gets an opaque base64url payload token encoding the
//! fields the NZB builder needs, and the system's own `/easynews/nzb`
//! endpoint reconstructs the form post on demand.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EasynewsConfig;
use crate::release::normalize_title;

use super::retry::with_retry;
use super::types::{IndexerClient, Release, SearchError, SearchPlan, SourceType};

const SEARCH_URL: &str = "https://members.easynews.com/2.0/search/solr-search/";
const DOWNLOAD_URL: &str = "https://members.easynews.com/2.0/api/dl-nzb";

/// Minimum candidate size; smaller hits are samples and stubs.
const MIN_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Extensions that can never be played directly.
const DISALLOWED_EXTENSIONS: &[&str] = &[
    ".rar", ".zip", ".exe", ".jpg", ".jpeg", ".png", ".gif", ".bmp",
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The fields the Easynews NZB builder needs, carried as a base64url
/// token inside the release instead of a download URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadToken {
    pub hash: String,
    pub filename: String,
    pub ext: String,
    pub sig: String,
}

impl PayloadToken {
    /// Encode to the opaque base64url form.
    pub fn encode(&self) -> String {
        // Serialization of a plain struct cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode from the opaque base64url form.
    pub fn decode(token: &str) -> Result<PayloadToken, SearchError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| SearchError::PayloadError(format!("Invalid payload token: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SearchError::PayloadError(format!("Invalid payload token: {e}")))
    }
}

/// Easynews search client.
pub struct EasynewsClient {
    client: Client,
    config: EasynewsConfig,
}

impl EasynewsClient {
    pub fn new(config: EasynewsConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    async fn search_once(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError> {
        let query = sanitize_query(&plan.query);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        debug!(query = %query, "Searching Easynews");

        let response = self
            .client
            .get(SEARCH_URL)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .query(&[
                ("gps", query.as_str()),
                ("pby", "100"),
                ("s1", "dsize"),
                ("s1d", "-"),
                ("fty[]", "VIDEO"),
                ("u", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else if e.is_connect() {
                    SearchError::ConnectionFailed(e.to_string())
                } else {
                    SearchError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SearchError::AuthFailed(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SearchError::ApiError(format!("HTTP {status}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::PayloadError(format!("Failed to parse response: {e}")))?;

        let items = payload
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        let releases = items
            .iter()
            .filter_map(|item| self.normalize(item, plan, &query))
            .collect::<Vec<_>>();

        debug!(results = releases.len(), "Easynews search complete");
        Ok(releases)
    }

    fn normalize(
        &self,
        item: &serde_json::Value,
        plan: &SearchPlan,
        query: &str,
    ) -> Option<Release> {
        let hash = pick_str(item, &["hash", "0"])?;
        let filename = pick_str(item, &["filename", "10"])?;
        let ext = pick_str(item, &["ext", "11", "2"]).unwrap_or_default();
        let sig = pick_str(item, &["sig"]).unwrap_or_default();
        let size = pick_u64(item, &["rawSize", "bytes", "4"]).unwrap_or(0);
        let posted = pick_str(item, &["posted", "5"])
            .as_deref()
            .and_then(parse_posted_date);

        if size < MIN_SIZE_BYTES {
            return None;
        }

        let ext_lower = ext.to_lowercase();
        if DISALLOWED_EXTENSIONS.iter().any(|d| ext_lower == *d) {
            return None;
        }

        let title = filename.clone();
        if !matches_strict(&title, plan, query) {
            return None;
        }

        let token = PayloadToken {
            hash,
            filename,
            ext,
            sig,
        };

        let mut release = Release::new(
            title,
            String::new(),
            "Easynews".to_string(),
            "easynews".to_string(),
            size,
            posted,
            SourceType::Easynews,
            false,
        );
        release.payload_token = Some(token.encode());
        Some(release)
    }

    /// Fetch the NZB for a previously issued payload token.
    pub async fn fetch_nzb(&self, token: &str) -> Result<Vec<u8>, SearchError> {
        let payload = PayloadToken::decode(token)?;

        let response = self
            .client
            .post(DOWNLOAD_URL)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .form(&[
                ("autoNZB", "1"),
                ("hash", payload.hash.as_str()),
                ("fn", payload.filename.as_str()),
                ("ext", payload.ext.as_str()),
                ("sig", payload.sig.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else {
                    SearchError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SearchError::AuthFailed(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SearchError::ApiError(format!("HTTP {status}")));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| SearchError::ApiError(e.to_string()))
    }
}

#[async_trait]
impl IndexerClient for EasynewsClient {
    fn name(&self) -> &str {
        "easynews"
    }

    async fn search(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError> {
        let result = with_retry(|| self.search_once(plan)).await;
        if let Err(e) = &result {
            warn!(error = %e, "Easynews search failed");
        }
        result
    }
}

/// Collapse punctuation to spaces and spell out ampersands.
pub fn sanitize_query(query: &str) -> String {
    let replaced = query.replace('&', " and ");
    replaced
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strict mode: the sanitized query must appear as a contiguous token
/// sequence in the candidate title, and the year / season / episode must
/// agree when the plan knows them.
fn matches_strict(title: &str, plan: &SearchPlan, query: &str) -> bool {
    let title_norm = normalize_title(title);
    let query_norm = normalize_title(query);

    if !query_norm.is_empty() {
        let title_tokens: Vec<&str> = title_norm.split(' ').collect();
        let query_tokens: Vec<&str> = query_norm.split(' ').collect();
        if !contains_subsequence(&title_tokens, &query_tokens) {
            return false;
        }
    }

    if let (Some(season), Some(episode)) = (plan.tokens.season, plan.tokens.episode) {
        let marker = format!("s{season:02}e{episode:02}");
        if !title_norm.split(' ').any(|t| t == marker) {
            return false;
        }
    }

    true
}

/// Whether `needle` appears as a contiguous subsequence of `haystack`.
fn contains_subsequence(haystack: &[&str], needle: &[&str]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn pick_str(item: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = item.get(*key) {
            if let Some(s) = value.as_str() {
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

fn pick_u64(item: &serde_json::Value, keys: &[&str]) -> Option<u64> {
    for key in keys {
        if let Some(value) = item.get(*key) {
            if let Some(n) = value.as_u64() {
                return Some(n);
            }
            if let Some(s) = value.as_str() {
                if let Ok(n) = s.parse::<u64>() {
                    return Some(n);
                }
            }
        }
    }
    None
}

fn parse_posted_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|ndt| ndt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::types::{PlanTokens, PlanType};

    fn make_client() -> EasynewsClient {
        EasynewsClient::new(EasynewsConfig {
            enabled: true,
            username: "user".to_string(),
            password: "pass".to_string(),
        })
    }

    fn movie_plan(query: &str) -> SearchPlan {
        SearchPlan {
            plan_type: PlanType::Movie,
            query: query.to_string(),
            tokens: PlanTokens::default(),
            strict_phrase: None,
        }
    }

    fn item(filename: &str, size: u64, ext: &str) -> serde_json::Value {
        serde_json::json!({
            "hash": "abc123",
            "filename": filename,
            "ext": ext,
            "sig": "sig456",
            "rawSize": size,
            "posted": "2024-06-15T10:30:00Z"
        })
    }

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("Fast & Furious"), "Fast and Furious");
        assert_eq!(sanitize_query("Movie: The.Sequel!"), "Movie The Sequel");
        assert_eq!(sanitize_query("  spaced   out  "), "spaced out");
    }

    #[test]
    fn test_payload_token_round_trip() {
        let token = PayloadToken {
            hash: "abc123".to_string(),
            filename: "movie.mkv".to_string(),
            ext: ".mkv".to_string(),
            sig: "sig456".to_string(),
        };
        let encoded = token.encode();
        // URL-safe alphabet only.
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(PayloadToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn test_decode_garbage_token_fails() {
        assert!(matches!(
            PayloadToken::decode("%%%not-base64%%%"),
            Err(SearchError::PayloadError(_))
        ));
    }

    #[test]
    fn test_normalize_accepts_matching_item() {
        let client = make_client();
        let plan = movie_plan("Some Movie 2023");
        let release = client
            .normalize(
                &item("Some.Movie.2023.1080p.WEB.mkv", 5_000_000_000, ".mkv"),
                &plan,
                "Some Movie 2023",
            )
            .unwrap();
        assert_eq!(release.source, SourceType::Easynews);
        assert!(release.download_url.is_empty());
        let token = PayloadToken::decode(release.payload_token.as_ref().unwrap()).unwrap();
        assert_eq!(token.hash, "abc123");
    }

    #[test]
    fn test_normalize_rejects_small_files() {
        let client = make_client();
        let plan = movie_plan("Some Movie");
        assert!(client
            .normalize(&item("Some.Movie.sample.mkv", 50 * 1024 * 1024, ".mkv"), &plan, "Some Movie")
            .is_none());
    }

    #[test]
    fn test_normalize_rejects_disallowed_extensions() {
        let client = make_client();
        let plan = movie_plan("Some Movie");
        for ext in [".rar", ".zip", ".exe", ".jpg"] {
            assert!(
                client
                    .normalize(&item("Some.Movie.2023", 5_000_000_000, ext), &plan, "Some Movie")
                    .is_none(),
                "extension {ext} must be filtered"
            );
        }
    }

    #[test]
    fn test_strict_requires_contiguous_tokens() {
        let plan = movie_plan("Some Movie");
        assert!(matches_strict("Some.Movie.2023.1080p", &plan, "Some Movie"));
        assert!(!matches_strict("Some.Other.Movie.2023", &plan, "Some Movie"));
    }

    #[test]
    fn test_strict_requires_episode_marker() {
        let plan = SearchPlan {
            plan_type: PlanType::Series,
            query: "The Show".to_string(),
            tokens: PlanTokens {
                season: Some(1),
                episode: Some(2),
                ..Default::default()
            },
            strict_phrase: None,
        };
        assert!(matches_strict("The.Show.S01E02.720p", &plan, "The Show"));
        assert!(!matches_strict("The.Show.S01E03.720p", &plan, "The Show"));
        assert!(!matches_strict("The.Show.720p", &plan, "The Show"));
    }

    #[test]
    fn test_contains_subsequence() {
        assert!(contains_subsequence(&["a", "b", "c"], &["b", "c"]));
        assert!(!contains_subsequence(&["a", "b", "c"], &["a", "c"]));
        assert!(contains_subsequence(&["a"], &[]));
        assert!(!contains_subsequence(&[], &["a"]));
    }

    #[test]
    fn test_numbered_field_fallbacks() {
        let client = make_client();
        let plan = movie_plan("Some Movie");
        let raw = serde_json::json!({
            "0": "hash789",
            "10": "Some.Movie.2023.mkv",
            "11": ".mkv",
            "sig": "s",
            "4": "5000000000"
        });
        let release = client.normalize(&raw, &plan, "Some Movie").unwrap();
        assert_eq!(release.size_bytes, 5_000_000_000);
        let token = PayloadToken::decode(release.payload_token.as_ref().unwrap()).unwrap();
        assert_eq!(token.hash, "hash789");
    }
}
