//! Mock metadata provider for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::indexer::PlanType;
use crate::metadata::{MetadataClient, MetadataError, ResolvedMetadata};

/// Mock implementation of the [`MetadataClient`] trait.
pub struct MockMetadata {
    result: Option<ResolvedMetadata>,
    fail_with: Option<String>,
    lookups: Arc<RwLock<Vec<String>>>,
}

impl MockMetadata {
    /// A mock that fails every lookup as not found.
    pub fn empty() -> Self {
        Self {
            result: None,
            fail_with: None,
            lookups: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A mock resolving every lookup to the given metadata.
    pub fn resolving(result: ResolvedMetadata) -> Self {
        Self {
            result: Some(result),
            fail_with: None,
            lookups: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A mock failing every lookup with an API error.
    pub fn failing(message: &str) -> Self {
        Self {
            result: None,
            fail_with: Some(message.to_string()),
            lookups: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The IMDb ids this mock was asked to resolve.
    pub async fn recorded_lookups(&self) -> Vec<String> {
        self.lookups.read().await.clone()
    }
}

#[async_trait]
impl MetadataClient for MockMetadata {
    async fn resolve_imdb(
        &self,
        imdb_id: &str,
        _plan_type: PlanType,
    ) -> Result<ResolvedMetadata, MetadataError> {
        self.lookups.write().await.push(imdb_id.to_string());

        if let Some(message) = &self.fail_with {
            return Err(MetadataError::ApiError {
                status: 500,
                message: message.clone(),
            });
        }

        self.result
            .clone()
            .ok_or_else(|| MetadataError::NotFound(imdb_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolving_mock() {
        let mock = MockMetadata::resolving(ResolvedMetadata {
            title: Some("The Movie".to_string()),
            year: Some(2023),
            ..Default::default()
        });

        let resolved = mock.resolve_imdb("tt0111161", PlanType::Movie).await.unwrap();
        assert_eq!(resolved.title.as_deref(), Some("The Movie"));
        assert_eq!(mock.recorded_lookups().await, vec!["tt0111161"]);
    }

    #[tokio::test]
    async fn test_empty_mock_not_found() {
        let mock = MockMetadata::empty();
        let result = mock.resolve_imdb("tt1", PlanType::Movie).await;
        assert!(matches!(result, Err(MetadataError::NotFound(_))));
    }
}
