//! Typed configuration assembled from the flat settings object.

use serde::{Deserialize, Serialize};

use crate::release::Resolution;

/// Number of direct Newznab slots exposed by the settings surface.
pub const NEWZNAB_SLOTS: usize = 20;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub aggregator: AggregatorConfig,
    /// Direct Newznab endpoints, one per populated slot (ordinal order).
    pub newznab: Vec<NewznabConfig>,
    pub ranking: RankingConfig,
    pub triage: TriageConfig,
    pub cache: CacheConfig,
    pub mount: MountConfig,
    pub easynews: EasynewsConfig,
    pub metadata: MetadataConfig,
}

/// HTTP server and addon identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Externally reachable base URL used when building playback URLs.
    pub base_url: String,
    /// Shared secret; doubles as the URL token prefix for all gated routes.
    pub shared_secret: String,
    pub addon_name: String,
}

/// Which aggregator dialect is configured, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerManager {
    None,
    Prowlarr,
    NzbHydra,
}

impl IndexerManager {
    pub fn from_setting(value: &str) -> Option<IndexerManager> {
        match value.to_lowercase().as_str() {
            "none" | "" => Some(IndexerManager::None),
            "prowlarr" => Some(IndexerManager::Prowlarr),
            "nzbhydra" => Some(IndexerManager::NzbHydra),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexerManager::None => "none",
            IndexerManager::Prowlarr => "prowlarr",
            IndexerManager::NzbHydra => "nzbhydra",
        }
    }
}

/// Aggregator (Prowlarr / NZBHydra) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub manager: IndexerManager,
    pub url: String,
    pub api_key: String,
    /// Circuit-breaker window after a failure.
    pub backoff_seconds: u64,
}

/// One direct Newznab endpoint (slot 1..=20).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewznabConfig {
    /// Ordinal slot number; kept for stable dedupe keys.
    pub slot: usize,
    pub endpoint: String,
    pub api_key: String,
    pub api_path: String,
    pub name: String,
    pub enabled: bool,
    /// Paid indexers win dedupe ties and are eligible for triage.
    pub paid: bool,
}

impl NewznabConfig {
    /// Usable means enabled with an API key present.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }

    /// Stable dedupe key derived from the display name, falling back to
    /// the endpoint host, falling back to the slot ordinal.
    pub fn dedupe_key(&self) -> String {
        let source = if !self.name.is_empty() {
            self.name.clone()
        } else if !self.endpoint.is_empty() {
            self.endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .split('/')
                .next()
                .unwrap_or("")
                .to_string()
        } else {
            format!("slot-{}", self.slot)
        };

        source
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// How the final stream list is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    QualityThenSize,
    LanguageQualitySize,
}

/// Ranking pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub sort_mode: SortMode,
    /// Preferred languages in priority order (language_quality_size mode).
    pub preferred_languages: Vec<String>,
    /// Hard cap on release size; `None` means unlimited.
    pub max_result_size_bytes: Option<u64>,
    /// Allowed resolutions; `None` admits everything.
    pub allowed_resolutions: Option<Vec<Resolution>>,
    /// Keep at most this many releases per resolution after sorting.
    pub resolution_limit_per_quality: Option<usize>,
    pub dedup_enabled: bool,
    pub hide_blocked_results: bool,
}

/// Triage (NZB health check) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    pub enabled: bool,
    pub time_budget_ms: u64,
    pub max_candidates: usize,
    pub download_concurrency: usize,
    /// NNTP pool capacity.
    pub max_connections: usize,
    pub stat_sample_count: usize,
    pub archive_sample_count: usize,
    pub nntp_host: String,
    pub nntp_port: u16,
    pub nntp_tls: bool,
    pub nntp_user: String,
    pub nntp_pass: String,
    pub nntp_keep_alive_ms: u64,
    /// Reuse the process-wide pool across requests when the config matches.
    pub reuse_pool: bool,
    /// Kick off a background mount for the first verified candidate.
    pub prefetch_first_verified: bool,
    /// Indexer dedupe keys triaged first.
    pub priority_indexers: Vec<String>,
    /// Indexer dedupe keys whose downloads must not run in parallel.
    pub serialized_indexers: Vec<String>,
}

/// Cache limits, one block per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub stream_ttl_minutes: u64,
    pub stream_max_size_mb: u64,
    pub verified_nzb_ttl_minutes: u64,
    pub verified_nzb_max_size_mb: u64,
    pub mount_ttl_minutes: u64,
}

/// Downstream mount service (NZB to ranged-HTTP bridge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub url: String,
    pub api_key: String,
    pub webdav_url: String,
    pub webdav_user: String,
    pub webdav_pass: String,
    pub category_movies: String,
    pub category_series: String,
}

/// Easynews adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EasynewsConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

/// External metadata provider (TMDB).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub tmdb_api_key: String,
}

// ---------------------------------------------------------------------------
// Sanitized view for the config endpoint (secrets redacted)
// ---------------------------------------------------------------------------

/// Config as exposed over HTTP: secrets replaced by configured flags.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub addon_name: String,
    pub port: u16,
    pub base_url: String,
    pub shared_secret_configured: bool,
    pub indexer_manager: String,
    pub aggregator_url: String,
    pub aggregator_key_configured: bool,
    pub newznab_slots: Vec<SanitizedNewznabConfig>,
    pub easynews_enabled: bool,
    pub triage_enabled: bool,
    pub nntp_host: String,
    pub nntp_credentials_configured: bool,
    pub mount_url: String,
    pub mount_key_configured: bool,
    pub tmdb_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNewznabConfig {
    pub slot: usize,
    pub name: String,
    pub endpoint: String,
    pub enabled: bool,
    pub paid: bool,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            addon_name: config.server.addon_name.clone(),
            port: config.server.port,
            base_url: config.server.base_url.clone(),
            shared_secret_configured: !config.server.shared_secret.is_empty(),
            indexer_manager: config.aggregator.manager.as_str().to_string(),
            aggregator_url: config.aggregator.url.clone(),
            aggregator_key_configured: !config.aggregator.api_key.is_empty(),
            newznab_slots: config
                .newznab
                .iter()
                .map(|n| SanitizedNewznabConfig {
                    slot: n.slot,
                    name: n.name.clone(),
                    endpoint: n.endpoint.clone(),
                    enabled: n.enabled,
                    paid: n.paid,
                    api_key_configured: !n.api_key.is_empty(),
                })
                .collect(),
            easynews_enabled: config.easynews.enabled,
            triage_enabled: config.triage.enabled,
            nntp_host: config.triage.nntp_host.clone(),
            nntp_credentials_configured: !config.triage.nntp_user.is_empty(),
            mount_url: config.mount.url.clone(),
            mount_key_configured: !config.mount.api_key.is_empty(),
            tmdb_key_configured: !config.metadata.tmdb_api_key.is_empty(),
        }
    }
}
