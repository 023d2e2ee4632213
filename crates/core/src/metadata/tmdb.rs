//! TMDB (The Movie Database) metadata client.
//!
//! Two calls per resolution: `/find/{imdb}` to map the IMDb id, then
//! the movie or TV details with alternative titles appended.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::MetadataConfig;
use crate::indexer::PlanType;

use super::types::{MetadataError, ResolvedMetadata};
use super::MetadataClient;

/// TMDB API client.
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    pub fn new(config: MetadataConfig) -> Result<Self, MetadataError> {
        if config.tmdb_api_key.is_empty() {
            return Err(MetadataError::NotConfigured(
                "TMDB API key is required".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: config.tmdb_api_key,
        })
    }

    /// Override the API endpoint (tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_json(&self, path: &str, extra: &[(&str, &str)]) -> Result<serde_json::Value, MetadataError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())]);
        for (k, v) in extra {
            request = request.query(&[(*k, *v)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == 401 {
            return Err(MetadataError::NotConfigured(
                "Invalid TMDB API key".to_string(),
            ));
        }
        if status == 404 {
            return Err(MetadataError::NotFound(path.to_string()));
        }
        if status == 429 {
            return Err(MetadataError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| MetadataError::ParseError(e.to_string()))
    }

    /// Map an IMDb id to the TMDB id via `/find`.
    async fn find_tmdb_id(
        &self,
        imdb_id: &str,
        plan_type: PlanType,
    ) -> Result<u32, MetadataError> {
        let payload = self
            .get_json(
                &format!("/find/{imdb_id}"),
                &[("external_source", "imdb_id")],
            )
            .await?;

        let results: FindResponse = serde_json::from_value(payload)
            .map_err(|e| MetadataError::ParseError(e.to_string()))?;

        let id = match plan_type {
            PlanType::Series => results.tv_results.first().map(|r| r.id),
            _ => results
                .movie_results
                .first()
                .map(|r| r.id)
                .or_else(|| results.tv_results.first().map(|r| r.id)),
        };

        id.ok_or_else(|| MetadataError::NotFound(format!("IMDb id {imdb_id}")))
    }
}

#[async_trait]
impl MetadataClient for TmdbClient {
    async fn resolve_imdb(
        &self,
        imdb_id: &str,
        plan_type: PlanType,
    ) -> Result<ResolvedMetadata, MetadataError> {
        let tmdb_id = self.find_tmdb_id(imdb_id, plan_type).await?;
        debug!(imdb_id = imdb_id, tmdb_id = tmdb_id, "TMDB id resolved");

        let (path, alt_key) = match plan_type {
            PlanType::Series => (format!("/tv/{tmdb_id}"), "results"),
            _ => (format!("/movie/{tmdb_id}"), "titles"),
        };

        let payload = self
            .get_json(&path, &[("append_to_response", "alternative_titles")])
            .await?;

        let title = payload
            .get("title")
            .or_else(|| payload.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let original_title = payload
            .get("original_title")
            .or_else(|| payload.get("original_name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let year = payload
            .get("release_date")
            .or_else(|| payload.get("first_air_date"))
            .and_then(|v| v.as_str())
            .and_then(|date| date.split('-').next())
            .and_then(|y| y.parse::<u32>().ok());

        let localized_titles = payload
            .get("alternative_titles")
            .and_then(|alt| alt.get(alt_key))
            .and_then(|v| v.as_array())
            .map(|titles| {
                titles
                    .iter()
                    .filter_map(|t| t.get("title").and_then(|v| v.as_str()))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let original_title = original_title.filter(|o| Some(o) != title.as_ref());

        Ok(ResolvedMetadata {
            tmdb_id: Some(tmdb_id),
            imdb_id: Some(imdb_id.to_string()),
            title,
            original_title,
            year,
            localized_titles,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<FindResult>,
    #[serde(default)]
    tv_results: Vec<FindResult>,
}

#[derive(Debug, Deserialize)]
struct FindResult {
    id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let result = TmdbClient::new(MetadataConfig {
            tmdb_api_key: String::new(),
        });
        assert!(matches!(result, Err(MetadataError::NotConfigured(_))));
    }

    #[test]
    fn test_find_response_parsing() {
        let json = r#"{
            "movie_results": [{"id": 278, "title": "The Shawshank Redemption"}],
            "tv_results": []
        }"#;
        let parsed: FindResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.movie_results[0].id, 278);
        assert!(parsed.tv_results.is_empty());
    }
}
