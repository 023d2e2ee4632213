//! Indexer search backends.
//!
//! Three concrete clients (aggregator, direct Newznab, Easynews) behind
//! one [`IndexerClient`] trait, plus the parallel fan-out that runs a
//! plan set across every backend and collects per-backend errors.

mod aggregator;
mod breaker;
mod easynews;
mod newznab;
mod retry;
mod types;

pub use aggregator::AggregatorClient;
pub use breaker::CircuitBreaker;
pub use easynews::{sanitize_query, EasynewsClient, PayloadToken};
pub use newznab::NewznabClient;
pub use retry::{with_retry, IsRetryable};
pub use types::*;

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::release::normalize_title;

/// Run every plan against every backend concurrently.
///
/// Failures are collected per backend and never abort the dispatch;
/// results are deduplicated by release identity (indexer key,
/// normalized title, publish instant, size) and filtered by each plan's
/// strict phrase when one is set.
pub async fn dispatch(
    clients: &[Arc<dyn IndexerClient>],
    plans: &[SearchPlan],
) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();

    let futures: Vec<_> = clients
        .iter()
        .flat_map(|client| {
            plans.iter().map(move |plan| {
                let client = client.clone();
                let plan = plan.clone();
                async move {
                    let result = client.search(&plan).await;
                    (client.name().to_string(), plan, result)
                }
            })
        })
        .collect();

    let results = futures::future::join_all(futures).await;

    let mut seen: HashSet<(String, String, i64, u64)> = HashSet::new();
    for (name, plan, result) in results {
        match result {
            Ok(releases) => {
                for release in releases {
                    if let Some(phrase) = &plan.strict_phrase {
                        if !matches_strict_phrase(&release.title, phrase) {
                            continue;
                        }
                    }
                    let key = (
                        release.indexer_id.clone(),
                        normalize_title(&release.title),
                        release
                            .publish_date
                            .map(|d| d.timestamp_millis())
                            .unwrap_or(0),
                        release.size_bytes,
                    );
                    if seen.insert(key) {
                        outcome.releases.push(release);
                    }
                }
            }
            Err(e) => {
                warn!(backend = %name, error = %e, "Indexer dispatch failed");
                outcome.errors.insert(name, e.to_string());
            }
        }
    }

    debug!(
        releases = outcome.releases.len(),
        failed_backends = outcome.errors.len(),
        "Dispatch complete"
    );
    outcome
}

/// Whether a title contains the phrase as a contiguous token
/// subsequence after normalization.
pub fn matches_strict_phrase(title: &str, phrase: &str) -> bool {
    let title_norm = normalize_title(title);
    let phrase_norm = normalize_title(phrase);
    if phrase_norm.is_empty() {
        return true;
    }

    let title_tokens: Vec<&str> = title_norm.split(' ').collect();
    let phrase_tokens: Vec<&str> = phrase_norm.split(' ').collect();
    if phrase_tokens.len() > title_tokens.len() {
        return false;
    }
    title_tokens
        .windows(phrase_tokens.len())
        .any(|w| w == phrase_tokens.as_slice())
}
