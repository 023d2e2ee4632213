//! Mock indexer backend for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::indexer::{IndexerClient, Release, SearchError, SearchPlan};

/// A query handler that produces results dynamically per plan.
type PlanHandler = Box<dyn Fn(&SearchPlan) -> Vec<Release> + Send + Sync>;

/// Mock implementation of the [`IndexerClient`] trait.
///
/// Provides controllable behavior for testing: fixed or per-plan
/// results, injected failures, and recorded plans for assertions.
pub struct MockIndexer {
    name: String,
    results: Vec<Release>,
    plans: Arc<RwLock<Vec<SearchPlan>>>,
    fail_with: Option<String>,
    handler: Option<PlanHandler>,
}

impl MockIndexer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Vec::new(),
            plans: Arc::new(RwLock::new(Vec::new())),
            fail_with: None,
            handler: None,
        }
    }

    /// Fixed results returned for every plan.
    pub fn with_results(mut self, results: Vec<Release>) -> Self {
        self.results = results;
        self
    }

    /// Make every search fail with an API error.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Produce results dynamically from the plan.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SearchPlan) -> Vec<Release> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Plans this mock has been asked to search, in call order.
    pub async fn recorded_plans(&self) -> Vec<SearchPlan> {
        self.plans.read().await.clone()
    }

    pub async fn search_count(&self) -> usize {
        self.plans.read().await.len()
    }
}

#[async_trait]
impl IndexerClient for MockIndexer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError> {
        self.plans.write().await.push(plan.clone());

        if let Some(message) = &self.fail_with {
            return Err(SearchError::ApiError(message.clone()));
        }

        if let Some(handler) = &self.handler {
            return Ok(handler(plan));
        }

        Ok(self.results.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{PlanTokens, PlanType, SourceType};

    fn plan(query: &str) -> SearchPlan {
        SearchPlan {
            plan_type: PlanType::Search,
            query: query.to_string(),
            tokens: PlanTokens::default(),
            strict_phrase: None,
        }
    }

    #[tokio::test]
    async fn test_fixed_results_and_recording() {
        let release = Release::new(
            "Movie.1080p".to_string(),
            "https://x/get/1".to_string(),
            "mock".to_string(),
            "mock".to_string(),
            1,
            None,
            SourceType::Direct,
            false,
        );
        let mock = MockIndexer::new("mock").with_results(vec![release]);

        let results = mock.search(&plan("a")).await.unwrap();
        assert_eq!(results.len(), 1);

        mock.search(&plan("b")).await.unwrap();
        let recorded = mock.recorded_plans().await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].query, "a");
        assert_eq!(recorded[1].query, "b");
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockIndexer::new("mock").failing("boom");
        let result = mock.search(&plan("a")).await;
        assert!(matches!(result, Err(SearchError::ApiError(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn test_handler_sees_plan() {
        let mock = MockIndexer::new("mock").with_handler(|plan| {
            if plan.query.contains("hit") {
                vec![Release::new(
                    "Hit".to_string(),
                    "https://x/get/hit".to_string(),
                    "mock".to_string(),
                    "mock".to_string(),
                    1,
                    None,
                    SourceType::Direct,
                    false,
                )]
            } else {
                Vec::new()
            }
        });

        assert_eq!(mock.search(&plan("a hit")).await.unwrap().len(), 1);
        assert!(mock.search(&plan("miss")).await.unwrap().is_empty());
    }
}
