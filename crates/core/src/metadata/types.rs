//! Metadata types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What metadata resolution produced for one identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub tmdb_id: Option<u32>,
    pub imdb_id: Option<String>,
    /// Primary (usually English) title.
    pub title: Option<String>,
    /// Original-language title when different.
    pub original_title: Option<String>,
    pub year: Option<u32>,
    /// Localized alternative titles.
    #[serde(default)]
    pub localized_titles: Vec<String>,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata provider not configured: {0}")]
    NotConfigured(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Metadata rate limit exceeded")]
    RateLimitExceeded,

    #[error("Metadata API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse metadata response: {0}")]
    ParseError(String),

    #[error("Metadata network error: {0}")]
    Network(#[from] reqwest::Error),
}
