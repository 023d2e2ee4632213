//! Orchestrator request and response types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indexer::PlanType;

/// A parsed stream request.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub plan_type: PlanType,
    /// The raw type segment as received ("movie" / "series").
    pub raw_type: String,
    /// The base identifier: "tt…" for IMDb, "tvdb:…" for TVDB.
    pub id: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl StreamRequest {
    /// Parse a path id like `tt0111161` or `tt0944947:1:2` or
    /// `tvdb:121361:1:2` together with its type segment.
    pub fn parse(raw_type: &str, raw_id: &str) -> Option<StreamRequest> {
        let plan_type = match raw_type {
            "movie" => PlanType::Movie,
            "series" => PlanType::Series,
            _ => return None,
        };

        let mut parts = raw_id.split(':').collect::<Vec<_>>();
        let (id, season, episode) = if parts.len() >= 3
            && parts[parts.len() - 1].chars().all(|c| c.is_ascii_digit())
            && parts[parts.len() - 2].chars().all(|c| c.is_ascii_digit())
        {
            let episode = parts.pop().and_then(|p| p.parse().ok());
            let season = parts.pop().and_then(|p| p.parse().ok());
            (parts.join(":"), season, episode)
        } else {
            (raw_id.to_string(), None, None)
        };

        if id.is_empty() {
            return None;
        }

        Some(StreamRequest {
            plan_type,
            raw_type: raw_type.to_string(),
            id,
            season,
            episode,
        })
    }

    /// IMDb id when the identifier is one.
    pub fn imdb_id(&self) -> Option<String> {
        self.id.starts_with("tt").then(|| self.id.clone())
    }

    /// TVDB id when the identifier carries one.
    pub fn tvdb_id(&self) -> Option<u32> {
        self.id.strip_prefix("tvdb:").and_then(|v| v.parse().ok())
    }

    pub fn episode_pair(&self) -> Option<(u32, u32)> {
        Some((self.season?, self.episode?))
    }
}

/// One playable stream in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    /// Short label shown in the source list.
    pub name: String,
    /// Multi-line description: title plus badges.
    pub description: String,
    /// Signed playback URL through the proxy.
    pub url: String,
}

/// The response document: `{"streams": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamsResponse {
    pub streams: Vec<Stream>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No indexer backends configured")]
    NoBackends,

    #[error("Invalid stream request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
