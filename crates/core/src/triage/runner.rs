//! Bounded, time-budgeted candidate evaluation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::TriageConfig;
use crate::indexer::{EasynewsClient, Release};
use crate::nntp::NntpPool;
use crate::release::normalize_title;

use super::analyzer::{analyze_nzb, AnalyzerParams};
use super::{
    is_success_token, release_key, TriageDecision, TriageError, TriageOutcome, TriageStatus,
    TriageSummary,
};

/// Hard timeout for fetching one NZB.
const NZB_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Evaluates candidate NZBs against the article server within a time
/// budget. Workers are bounded by the download-concurrency setting and
/// candidates from serialized indexers never download in parallel.
pub struct TriageRunner {
    pool: NntpPool,
    http: reqwest::Client,
    config: TriageConfig,
    easynews: Option<Arc<EasynewsClient>>,
}

impl TriageRunner {
    pub fn new(
        pool: NntpPool,
        config: TriageConfig,
        easynews: Option<Arc<EasynewsClient>>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(NZB_FETCH_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            pool,
            http,
            config,
            easynews,
        }
    }

    /// Run triage over the candidate list.
    pub async fn run(&self, candidates: Vec<Release>) -> TriageOutcome {
        let start = Instant::now();
        let budget = Duration::from_millis(self.config.time_budget_ms);
        let deadline = start + budget;

        let candidates = dedupe_and_cap(candidates, self.config.max_candidates);
        if candidates.is_empty() {
            return TriageOutcome {
                decisions: HashMap::new(),
                summary: self.summary(&HashMap::new(), start, false),
            };
        }

        debug!(
            candidates = candidates.len(),
            budget_ms = self.config.time_budget_ms,
            "Starting triage run"
        );

        // Per-indexer serialization locks for backends that ban
        // parallel downloads.
        let serialized: HashSet<String> =
            self.config.serialized_indexers.iter().cloned().collect();
        let locks: HashMap<String, Arc<Mutex<()>>> = serialized
            .iter()
            .map(|id| (id.clone(), Arc::new(Mutex::new(()))))
            .collect();

        let queue: Arc<Mutex<VecDeque<Release>>> =
            Arc::new(Mutex::new(candidates.into_iter().collect()));
        let decisions: Arc<Mutex<HashMap<String, TriageDecision>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let worker_count = self.config.download_concurrency.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let queue = queue.clone();
            let decisions = decisions.clone();
            let locks = locks.clone();
            workers.push(async move {
                loop {
                    let candidate = {
                        let mut queue = queue.lock().await;
                        let Some(candidate) = queue.pop_front() else {
                            return;
                        };
                        candidate
                    };

                    // Budget check before starting, never mid-flight:
                    // an expired budget turns the remaining untouched
                    // candidates into pending decisions.
                    if Instant::now() >= deadline {
                        let decision =
                            TriageDecision::for_release(&candidate, TriageStatus::Pending);
                        decisions
                            .lock()
                            .await
                            .insert(release_key(&candidate), decision);
                        continue;
                    }

                    let _serial_guard = match locks.get(&candidate.indexer_id) {
                        Some(lock) => Some(lock.clone().lock_owned().await),
                        None => None,
                    };

                    let decision = self.evaluate(&candidate, deadline).await;
                    decisions
                        .lock()
                        .await
                        .insert(release_key(&candidate), decision);
                }
            });
        }
        futures::future::join_all(workers).await;

        self.pool.touch();

        let decisions = Arc::try_unwrap(decisions)
            .map(|m| m.into_inner())
            .unwrap_or_default();
        let timed_out = start.elapsed() >= budget;
        let summary = self.summary(&decisions, start, timed_out);

        debug!(
            elapsed_ms = summary.elapsed_ms,
            timed_out = summary.timed_out,
            "Triage run complete"
        );

        TriageOutcome { decisions, summary }
    }

    /// Fetch and analyze one candidate, synthesizing its decision.
    async fn evaluate(&self, candidate: &Release, deadline: Instant) -> TriageDecision {
        let mut decision = TriageDecision::for_release(candidate, TriageStatus::Unverified);

        let nzb_body = match self.fetch_nzb(candidate).await {
            Ok(body) => body,
            Err(e) => {
                warn!(title = %candidate.title, error = %e, "NZB fetch failed");
                decision.status = TriageStatus::FetchError;
                decision.warnings.push(e.to_string());
                return decision;
            }
        };

        let params = AnalyzerParams {
            stat_sample_count: self.config.stat_sample_count,
            archive_sample_count: self.config.archive_sample_count,
        };

        match analyze_nzb(&self.pool, &nzb_body, params, deadline).await {
            Ok(report) => {
                decision.file_count = report.file_count;
                decision.findings = report.findings;
                decision.blockers = report.blockers;
                decision.warnings.extend(report.warnings);

                decision.status = synthesize_status(
                    &decision.blockers,
                    &decision.findings,
                    &decision.warnings,
                );
                if decision.status == TriageStatus::Verified {
                    decision.nzb_body = Some(nzb_body);
                }
            }
            Err(e) => {
                warn!(title = %candidate.title, error = %e, "Triage analysis failed");
                decision.status = TriageStatus::Error;
                decision.warnings.push(e.to_string());
            }
        }

        decision
    }

    /// Download the NZB as UTF-8, via HTTP or the Easynews builder.
    async fn fetch_nzb(&self, candidate: &Release) -> Result<String, TriageError> {
        if candidate.download_url.is_empty() {
            let token = candidate
                .payload_token
                .as_deref()
                .ok_or_else(|| TriageError::Fetch("release has no download URL".to_string()))?;
            let client = self
                .easynews
                .as_ref()
                .ok_or_else(|| TriageError::Fetch("Easynews is not configured".to_string()))?;
            let bytes = client
                .fetch_nzb(token)
                .await
                .map_err(|e| TriageError::Fetch(e.to_string()))?;
            return String::from_utf8(bytes)
                .map_err(|e| TriageError::Fetch(format!("NZB is not UTF-8: {e}")));
        }

        let response = self
            .http
            .get(&candidate.download_url)
            .send()
            .await
            .map_err(|e| TriageError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TriageError::Fetch(format!("HTTP {}", response.status())));
        }

        response
            .text()
            .await
            .map_err(|e| TriageError::Fetch(e.to_string()))
    }

    fn summary(
        &self,
        decisions: &HashMap<String, TriageDecision>,
        start: Instant,
        timed_out: bool,
    ) -> TriageSummary {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for decision in decisions.values() {
            *counts.entry(decision.status.label().to_string()).or_insert(0) += 1;
        }
        TriageSummary {
            counts,
            elapsed_ms: start.elapsed().as_millis() as u64,
            timed_out,
            pool: Some(self.pool.metrics()),
        }
    }
}

/// Decision synthesis per the triage contract.
pub fn synthesize_status(
    blockers: &[String],
    findings: &[String],
    warnings: &[String],
) -> TriageStatus {
    if !blockers.is_empty() {
        return TriageStatus::Blocked;
    }
    if findings.iter().any(|f| is_success_token(f)) {
        return TriageStatus::Verified;
    }
    // No blockers and no positive finding: 7z-only evidence upgrades
    // to the dedicated status.
    if warnings.iter().any(|w| w == "sevenzip-untested") {
        return TriageStatus::Unverified7z;
    }
    // No evidence at all: the analysis left nothing behind except at
    // most the no-archive marker, so there was nothing to evaluate
    // (no candidates after processing, or the budget expired before
    // the first probe).
    if warnings.iter().all(|w| w == "no-archive-candidates") {
        return TriageStatus::Skipped;
    }
    TriageStatus::Unverified
}

/// Keep the first release per normalized title, capped at `max`.
fn dedupe_and_cap(candidates: Vec<Release>, max: usize) -> Vec<Release> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(normalize_title(&c.title)))
        .take(max)
        .collect()
}
