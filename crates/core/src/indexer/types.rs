//! Types for the indexer search system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::release::{parse_release, Resolution};

/// Where a release came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Aggregator,
    Direct,
    Easynews,
}

/// One candidate NZB release, immutable once constructed.
///
/// Identity for dedupe purposes is (indexer key, normalized title,
/// publish instant, size).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Raw title as reported by the indexer.
    pub title: String,
    /// URL the NZB can be fetched from. Empty for Easynews results,
    /// which carry a payload token instead.
    pub download_url: String,
    /// Indexer display name.
    pub indexer_name: String,
    /// Stable indexer key (dedupe key of the slot, or the backend name).
    pub indexer_id: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Publish instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    /// Age in days at search time.
    pub age_days: u32,
    /// Detected resolution.
    pub resolution: Resolution,
    /// Detected languages.
    pub languages: Vec<String>,
    /// Quality score derived from the resolution rank.
    pub quality_score: u32,
    pub source: SourceType,
    /// Whether the owning indexer is flagged paid.
    pub paid: bool,
    /// Opaque Easynews payload token (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_token: Option<String>,
}

impl Release {
    /// Construct a release, deriving parsed attributes from the title.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: String,
        download_url: String,
        indexer_name: String,
        indexer_id: String,
        size_bytes: u64,
        publish_date: Option<DateTime<Utc>>,
        source: SourceType,
        paid: bool,
    ) -> Self {
        let parsed = parse_release(&title);
        let age_days = publish_date
            .map(|d| (Utc::now() - d).num_days().max(0) as u32)
            .unwrap_or(0);

        Self {
            title,
            download_url,
            indexer_name,
            indexer_id,
            size_bytes,
            publish_date,
            age_days,
            resolution: parsed.resolution,
            languages: parsed.languages,
            quality_score: parsed.quality_score,
            source,
            paid,
            payload_token: None,
        }
    }
}

/// What kind of search a plan performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    #[default]
    Movie,
    Series,
    Search,
}

impl PlanType {
    /// The Newznab `t=` parameter for this plan type.
    pub fn newznab_t(&self) -> &'static str {
        match self {
            PlanType::Movie => "movie",
            PlanType::Series => "tvsearch",
            PlanType::Search => "search",
        }
    }
}

/// Structured tokens attached to a plan instead of free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

impl PlanTokens {
    pub fn is_empty(&self) -> bool {
        self.imdb_id.is_none()
            && self.tvdb_id.is_none()
            && self.season.is_none()
            && self.episode.is_none()
    }
}

/// One search to dispatch against every indexer backend.
///
/// Identity is (plan type, canonical query); the planner dedupes on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub plan_type: PlanType,
    /// Free-text query; may be empty for purely token-driven plans.
    pub query: String,
    #[serde(default)]
    pub tokens: PlanTokens,
    /// When set, candidate titles must contain this phrase as a
    /// contiguous token subsequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_phrase: Option<String>,
}

impl SearchPlan {
    /// Canonical query used for plan identity.
    pub fn canonical_query(&self) -> String {
        if !self.query.is_empty() {
            return crate::release::normalize_title(&self.query);
        }
        let t = &self.tokens;
        format!(
            "imdb:{} tvdb:{} s:{} e:{}",
            t.imdb_id.as_deref().unwrap_or("-"),
            t.tvdb_id.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            t.season.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            t.episode.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
        )
    }

    /// Plan identity for dedupe.
    pub fn identity(&self) -> (PlanType, String) {
        (self.plan_type, self.canonical_query())
    }
}

/// Errors that can occur while searching one backend.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Indexer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Indexer API error: {0}")]
    ApiError(String),

    #[error("Authorization failed: {0}")]
    AuthFailed(String),

    #[error("Malformed indexer payload: {0}")]
    PayloadError(String),

    #[error("Backend unavailable until backoff expires")]
    CircuitOpen,
}

/// Trait for indexer search backends.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Backend name for logging and error maps.
    fn name(&self) -> &str;

    /// Execute one search plan.
    async fn search(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError>;
}

/// Result of fanning one plan set out across every backend.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub releases: Vec<Release>,
    /// Backend name -> error message, for backends that failed.
    pub errors: HashMap<String, String>,
}

impl SearchOutcome {
    pub fn merge(&mut self, other: SearchOutcome) {
        self.releases.extend(other.releases);
        self.errors.extend(other.errors);
    }
}
