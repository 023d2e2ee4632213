//! Aggregator (Prowlarr / NZBHydra) search backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AggregatorConfig;

use super::breaker::CircuitBreaker;
use super::retry::with_retry;
use super::types::{IndexerClient, Release, SearchError, SearchPlan, SourceType};

/// HTTP timeout for one aggregator call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregator search client.
///
/// Issues one GET per plan against the manager's search endpoint and
/// normalizes the JSON item array into [`Release`]s. All failures arm
/// the shared circuit breaker; calls inside the backoff window return
/// empty without touching the network.
pub struct AggregatorClient {
    client: Client,
    config: AggregatorConfig,
    breaker: Arc<CircuitBreaker>,
}

impl AggregatorClient {
    pub fn new(config: AggregatorConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            breaker,
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Build the search URL for a plan. Structured tokens become
    /// dedicated query parameters.
    fn build_search_url(&self, plan: &SearchPlan) -> String {
        let mut url = format!(
            "{}/api/v1/search?query={}",
            self.base_url(),
            urlencoding::encode(&plan.query)
        );

        if let Some(imdb) = &plan.tokens.imdb_id {
            url.push_str(&format!("&imdbId={}", urlencoding::encode(imdb)));
        }
        if let Some(tvdb) = plan.tokens.tvdb_id {
            url.push_str(&format!("&tvdbId={tvdb}"));
        }
        if let Some(season) = plan.tokens.season {
            url.push_str(&format!("&season={season}"));
        }
        if let Some(episode) = plan.tokens.episode {
            url.push_str(&format!("&episode={episode}"));
        }

        url
    }

    async fn search_once(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError> {
        let url = self.build_search_url(plan);
        debug!(manager = self.config.manager.as_str(), "Searching aggregator");

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.config.api_key)
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
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let items: Vec<AggregatorItem> = response
            .json()
            .await
            .map_err(|e| SearchError::PayloadError(format!("Failed to parse response: {e}")))?;

        let releases = items
            .into_iter()
            .filter_map(|item| self.normalize(item))
            .collect::<Vec<_>>();

        debug!(results = releases.len(), "Aggregator search complete");
        Ok(releases)
    }

    fn normalize(&self, item: AggregatorItem) -> Option<Release> {
        let download_url = item
            .download_url
            .or(item.link)
            .or(item.guid)
            .filter(|u| !u.is_empty())?;

        let publish_date = item.publish_date.as_deref().and_then(parse_publish_date);
        let indexer_name = item
            .indexer
            .unwrap_or_else(|| self.config.manager.as_str().to_string());
        let indexer_id = item
            .indexer_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| indexer_name.to_lowercase().replace(' ', "-"));

        Some(Release::new(
            item.title?,
            download_url,
            indexer_name,
            indexer_id,
            item.size.unwrap_or(0).max(0) as u64,
            publish_date,
            SourceType::Aggregator,
            false,
        ))
    }
}

#[async_trait]
impl IndexerClient for AggregatorClient {
    fn name(&self) -> &str {
        self.config.manager.as_str()
    }

    async fn search(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError> {
        if self.breaker.is_open() {
            debug!("Aggregator circuit open, short-circuiting to empty");
            return Ok(Vec::new());
        }

        let result = with_retry(|| self.search_once(plan)).await;
        if let Err(e) = &result {
            warn!(error = %e, "Aggregator search failed");
            self.breaker.trip();
        }
        result
    }
}

/// Parse the publish date formats aggregators actually emit.
fn parse_publish_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

// Aggregator API response item; field names follow the Prowlarr dialect,
// NZBHydra aliases are merged in.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatorItem {
    title: Option<String>,
    download_url: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    size: Option<i64>,
    publish_date: Option<String>,
    indexer: Option<String>,
    indexer_id: Option<i64>,
}
