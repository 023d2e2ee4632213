//! External metadata lookup.
//!
//! Resolves request identifiers into titles, years and localized
//! aliases through TMDB. Behind a trait so the orchestrator can be
//! tested without the network.

mod tmdb;
mod types;

pub use tmdb::TmdbClient;
pub use types::{MetadataError, ResolvedMetadata};

use async_trait::async_trait;

use crate::indexer::PlanType;

/// Trait for metadata providers.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Resolve an IMDb id into title material.
    async fn resolve_imdb(
        &self,
        imdb_id: &str,
        plan_type: PlanType,
    ) -> Result<ResolvedMetadata, MetadataError>;
}
