//! The stream-request handler.
//!
//! Composes planner, indexer fan-out, ranker, triage, caches and the
//! mount service into one request flow and assembles the stream list.

mod types;

pub use types::{OrchestratorError, Stream, StreamRequest, StreamsResponse};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tracing::{debug, info, warn};

use crate::cache::{
    response_cache_key, CachedResponse, MountHandleCache, MountKey, ResponseCache, VerifiedNzb,
    VerifiedNzbCache, RESPONSE_CACHE_VERSION,
};
use crate::config::{Config, IndexerManager};
use crate::indexer::{
    dispatch, AggregatorClient, CircuitBreaker, EasynewsClient, IndexerClient, NewznabClient,
    Release, SearchOutcome, SourceType,
};
use crate::metadata::MetadataClient;
use crate::mount::{MountService, NzbSource};
use crate::nntp::{PoolConfig, PoolRegistry};
use crate::nzb::parse_nzb;
use crate::planner::{self, PlanRequest, TitleCandidates};
use crate::ranker;
use crate::release::{normalize_title, Resolution};
use crate::triage::{release_key, TriageDecision, TriageRunner, TriageStatus};

/// Two uploads of one title within this window are the same release.
const DECISION_MATCH_WINDOW_DAYS: i64 = 14;

/// Everything the request handler composes. Process-wide singletons
/// (caches, pool registry) are passed in explicitly.
pub struct Orchestrator {
    config: Config,
    indexers: Vec<Arc<dyn IndexerClient>>,
    easynews: Option<Arc<EasynewsClient>>,
    metadata: Option<Arc<dyn MetadataClient>>,
    mount: Option<Arc<MountService>>,
    response_cache: Arc<ResponseCache>,
    nzb_cache: Arc<VerifiedNzbCache>,
    mount_cache: Arc<MountHandleCache>,
    pool_registry: Arc<PoolRegistry>,
    /// Dedupe keys of paid slots: the triage-eligible subset.
    paid_indexers: HashSet<String>,
}

impl Orchestrator {
    /// Wire up the orchestrator from config plus the shared singletons.
    pub fn new(
        config: Config,
        metadata: Option<Arc<dyn MetadataClient>>,
        mount: Option<Arc<MountService>>,
        response_cache: Arc<ResponseCache>,
        nzb_cache: Arc<VerifiedNzbCache>,
        mount_cache: Arc<MountHandleCache>,
        pool_registry: Arc<PoolRegistry>,
    ) -> Self {
        let mut indexers: Vec<Arc<dyn IndexerClient>> = Vec::new();

        if config.aggregator.manager != IndexerManager::None {
            let breaker = Arc::new(CircuitBreaker::new(std::time::Duration::from_secs(
                config.aggregator.backoff_seconds,
            )));
            indexers.push(Arc::new(AggregatorClient::new(
                config.aggregator.clone(),
                breaker,
            )));
        }

        for slot in config.newznab.iter().filter(|s| s.is_usable()) {
            indexers.push(Arc::new(NewznabClient::new(slot.clone())));
        }

        let easynews = config
            .easynews
            .enabled
            .then(|| Arc::new(EasynewsClient::new(config.easynews.clone())));
        if let Some(client) = &easynews {
            indexers.push(client.clone() as Arc<dyn IndexerClient>);
        }

        let mut paid_indexers: HashSet<String> = config
            .newznab
            .iter()
            .filter(|s| s.paid)
            .map(|s| s.dedupe_key())
            .collect();
        paid_indexers.extend(config.triage.priority_indexers.iter().cloned());

        Self {
            config,
            indexers,
            easynews,
            metadata,
            mount,
            response_cache,
            nzb_cache,
            mount_cache,
            pool_registry,
            paid_indexers,
        }
    }

    /// Extra backends injected for tests.
    pub fn with_extra_indexer(mut self, client: Arc<dyn IndexerClient>) -> Self {
        self.indexers.push(client);
        self
    }

    /// Handle one stream request end to end.
    pub async fn handle(
        &self,
        request: &StreamRequest,
    ) -> Result<StreamsResponse, OrchestratorError> {
        if self.indexers.is_empty() {
            return Err(OrchestratorError::NoBackends);
        }

        let cache_key = response_cache_key(
            &request.raw_type,
            &request.id,
            request.episode_pair(),
            &[],
        );

        // Full hit: triage finished, serve as stored.
        let cached = self.response_cache.get(&cache_key);
        if let Some(entry) = &cached {
            if entry.triage_complete {
                debug!(id = %request.id, "Response cache hit (complete)");
                return serde_json::from_value(entry.payload.clone())
                    .map_err(|e| OrchestratorError::Internal(e.to_string()));
            }
        }

        // Partial hit: reuse the release list, resume triage on the
        // still-pending URLs (re-validated against the current list).
        let (releases, mut decisions) = match cached {
            Some(entry) => {
                debug!(id = %request.id, "Response cache hit (partial), resuming triage");
                let live_keys: HashSet<String> =
                    entry.releases.iter().map(release_key).collect();
                let mut decisions = entry.decisions;
                decisions.retain(|key, d| d.status.is_final() || live_keys.contains(key));
                (entry.releases, decisions)
            }
            None => (self.search(request).await?, HashMap::new()),
        };

        // Triage the paid/health-eligible subset.
        if self.config.triage.enabled
            && (request.imdb_id().is_some() || request.tvdb_id().is_some())
        {
            self.run_triage(&releases, &mut decisions).await;
        }

        // Instant tags come from the mount service's completed history.
        let instant_jobs = self.completed_history().await;

        let response = self.assemble(request, &releases, &decisions, &instant_jobs);

        // Best-effort mount prefetch for the first verified candidate.
        if self.config.triage.prefetch_first_verified {
            self.prefetch_first_verified(request, &releases, &decisions);
        }

        let pending_urls: Vec<String> = releases
            .iter()
            .map(release_key)
            .filter(|key| {
                decisions
                    .get(key)
                    .map(|d| !d.status.is_final())
                    .unwrap_or(false)
            })
            .collect();
        let triage_complete = pending_urls.is_empty();

        let payload = serde_json::to_value(&response)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        self.response_cache.insert(
            cache_key,
            CachedResponse {
                version: RESPONSE_CACHE_VERSION,
                stored_at: chrono::Utc::now(),
                payload,
                triage_complete,
                pending_urls,
                decisions,
                releases,
            },
        );

        Ok(response)
    }

    /// Plan and dispatch the search: id plans concurrently with
    /// metadata resolution, then text plans, then the alternate-title
    /// fallback when everything came back empty.
    async fn search(&self, request: &StreamRequest) -> Result<Vec<Release>, OrchestratorError> {
        let plan_request = PlanRequest {
            plan_type: request.plan_type,
            imdb_id: request.imdb_id(),
            tvdb_id: request.tvdb_id(),
            season: request.season,
            episode: request.episode,
        };

        let id_plans = planner::id_plans(&plan_request);

        let (titles, mut outcome) = tokio::join!(
            self.resolve_titles(request),
            dispatch(&self.indexers, &id_plans)
        );

        let text_plans = planner::text_plans(&plan_request, &titles);
        let text_plans: Vec<_> = text_plans
            .into_iter()
            .filter(|p| !id_plans.iter().any(|existing| existing.identity() == p.identity()))
            .collect();
        if !text_plans.is_empty() {
            outcome.merge(dispatch(&self.indexers, &text_plans).await);
        }

        if outcome.releases.is_empty() {
            if let Some(fallback) = planner::fallback_plan(&plan_request, &titles) {
                debug!(query = %fallback.query, "Falling back to alternate original title");
                outcome.merge(dispatch(&self.indexers, &[fallback]).await);
            }
        }

        let SearchOutcome { releases, errors } = outcome;
        if !errors.is_empty() {
            info!(failed = errors.len(), "Some backends failed during search");
        }

        // Each dispatch dedupes internally; collapse across batches too.
        let mut seen: HashSet<(String, String, i64, u64)> = HashSet::new();
        let releases: Vec<Release> = releases
            .into_iter()
            .filter(|r| {
                seen.insert((
                    r.indexer_id.clone(),
                    normalize_title(&r.title),
                    r.publish_date.map(|d| d.timestamp_millis()).unwrap_or(0),
                    r.size_bytes,
                ))
            })
            .collect();

        Ok(ranker::rank(releases, &self.config.ranking))
    }

    async fn resolve_titles(&self, request: &StreamRequest) -> TitleCandidates {
        let Some(metadata) = &self.metadata else {
            return TitleCandidates::default();
        };
        let Some(imdb_id) = request.imdb_id() else {
            return TitleCandidates::default();
        };

        match metadata.resolve_imdb(&imdb_id, request.plan_type).await {
            Ok(resolved) => TitleCandidates {
                primary: resolved.title,
                original: resolved.original_title,
                localized: resolved.localized_titles,
                year: resolved.year,
            },
            Err(e) => {
                warn!(imdb_id = %imdb_id, error = %e, "Metadata resolution failed");
                TitleCandidates::default()
            }
        }
    }

    /// Run the triage runner over candidates that still need a verdict,
    /// merging decisions monotonically and caching verified payloads.
    async fn run_triage(
        &self,
        releases: &[Release],
        decisions: &mut HashMap<String, TriageDecision>,
    ) {
        let candidates: Vec<Release> = releases
            .iter()
            .filter(|r| self.triage_eligible(r))
            .filter(|r| self.final_decision_for(r, decisions).is_none())
            .cloned()
            .collect();

        if candidates.is_empty() {
            return;
        }

        let triage = &self.config.triage;
        let pool = self
            .pool_registry
            .get_or_build(
                PoolConfig {
                    host: triage.nntp_host.clone(),
                    port: triage.nntp_port,
                    tls: triage.nntp_tls,
                    user: triage.nntp_user.clone(),
                    pass: triage.nntp_pass.clone(),
                    capacity: triage.max_connections,
                    keep_alive: std::time::Duration::from_millis(triage.nntp_keep_alive_ms),
                },
                triage.reuse_pool,
            )
            .await;

        let runner = TriageRunner::new(pool, triage.clone(), self.easynews.clone());
        let outcome = runner.run(candidates).await;

        info!(
            evaluated = outcome.decisions.len(),
            elapsed_ms = outcome.summary.elapsed_ms,
            timed_out = outcome.summary.timed_out,
            "Triage finished"
        );

        for (key, decision) in outcome.decisions {
            if let Some(d) = &decision.nzb_body {
                let document = parse_nzb(d).ok();
                self.nzb_cache.insert(
                    key.clone(),
                    VerifiedNzb {
                        body: d.clone().into_bytes(),
                        title: decision.title.clone(),
                        declared_size: document
                            .as_ref()
                            .map(|doc| doc.total_bytes())
                            .unwrap_or(0),
                        filename: format!("{}.nzb", decision.normalized_title.replace(' ', ".")),
                    },
                );
            }

            // Monotone: a final decision is never regressed.
            match decisions.get(&key) {
                Some(existing) if existing.status.is_final() => {}
                _ => {
                    decisions.insert(key, decision);
                }
            }
        }
    }

    fn triage_eligible(&self, release: &Release) -> bool {
        match release.source {
            SourceType::Easynews => self.config.easynews.enabled,
            _ => release.paid || self.paid_indexers.contains(&release.indexer_id),
        }
    }

    /// A final decision directly keyed, or one sharing the normalized
    /// title within the 14-day publish window.
    fn final_decision_for<'a>(
        &self,
        release: &Release,
        decisions: &'a HashMap<String, TriageDecision>,
    ) -> Option<&'a TriageDecision> {
        let key = release_key(release);
        if let Some(decision) = decisions.get(&key) {
            if decision.status.is_final() {
                return Some(decision);
            }
        }

        let title = normalize_title(&release.title);
        let release_ms = release
            .publish_date
            .map(|d| d.timestamp_millis())
            .unwrap_or(0);
        let window_ms = ChronoDuration::days(DECISION_MATCH_WINDOW_DAYS).num_milliseconds();

        decisions.values().find(|d| {
            d.status.is_final() && d.normalized_title == title && {
                let decision_ms = d.publish_date.map(|p| p.timestamp_millis()).unwrap_or(0);
                (decision_ms - release_ms).abs() <= window_ms
            }
        })
    }

    async fn completed_history(&self) -> HashMap<String, crate::mount::HistoryJob> {
        let Some(mount) = &self.mount else {
            return HashMap::new();
        };
        match mount.completed_jobs().await {
            Ok(jobs) => jobs
                .into_iter()
                .map(|job| (normalize_title(&job.name), job))
                .collect(),
            Err(e) => {
                debug!(error = %e, "History lookup for instant tags failed");
                HashMap::new()
            }
        }
    }

    /// Build the ordered stream list: badges, triage tags, instant
    /// tags, signed playback URLs. Instant streams sort first.
    fn assemble(
        &self,
        request: &StreamRequest,
        releases: &[Release],
        decisions: &HashMap<String, TriageDecision>,
        instant_jobs: &HashMap<String, crate::mount::HistoryJob>,
    ) -> StreamsResponse {
        let mut instant = Vec::new();
        let mut regular = Vec::new();

        for release in releases {
            let decision = decisions.get(&release_key(release));
            let status = decision.map(|d| d.status);

            if self.config.ranking.hide_blocked_results
                && status == Some(TriageStatus::Blocked)
            {
                continue;
            }

            let job = instant_jobs.get(&normalize_title(&release.title));
            let stream = self.build_stream(request, release, status, job);
            if job.is_some() {
                instant.push(stream);
            } else {
                regular.push(stream);
            }
        }

        instant.extend(regular);
        StreamsResponse { streams: instant }
    }

    fn build_stream(
        &self,
        request: &StreamRequest,
        release: &Release,
        status: Option<TriageStatus>,
        instant_job: Option<&crate::mount::HistoryJob>,
    ) -> Stream {
        let mut badges: Vec<String> = Vec::new();
        badges.push(release.resolution.label().to_string());
        badges.push(format_size(release.size_bytes));
        if !release.languages.is_empty() {
            badges.push(release.languages.join("/"));
        }
        if let Some(tag) = status.map(triage_tag) {
            badges.push(tag.to_string());
        }
        if instant_job.is_some() {
            badges.push("⚡ Instant".to_string());
        }

        let resolution_line = if release.resolution == Resolution::Unknown {
            "SD".to_string()
        } else {
            release.resolution.label().to_string()
        };

        Stream {
            name: format!("{}\n{}", self.config.server.addon_name, resolution_line),
            description: format!("{}\n{}", release.title, badges.join(" | ")),
            url: self.playback_url(request, release, instant_job),
        }
    }

    fn playback_url(
        &self,
        request: &StreamRequest,
        release: &Release,
        instant_job: Option<&crate::mount::HistoryJob>,
    ) -> String {
        let base = self.config.server.base_url.trim_end_matches('/');
        let token = &self.config.server.shared_secret;

        let mut url = format!(
            "{base}/{token}/nzb/stream?downloadUrl={}&type={}&id={}&title={}&size={}",
            urlencoding::encode(&release.download_url),
            urlencoding::encode(&request.raw_type),
            urlencoding::encode(&full_request_id(request)),
            urlencoding::encode(&release.title),
            release.size_bytes,
        );

        if let Some(payload) = &release.payload_token {
            url.push_str(&format!("&easynewsPayload={}", urlencoding::encode(payload)));
        }
        if let Some(job) = instant_job {
            url.push_str(&format!(
                "&historyNzoId={}&historyJobName={}&historyCategory={}",
                urlencoding::encode(&job.nzo_id),
                urlencoding::encode(&job.name),
                urlencoding::encode(&job.category),
            ));
        }

        url
    }

    /// Background mount build for the first verified candidate.
    fn prefetch_first_verified(
        &self,
        request: &StreamRequest,
        releases: &[Release],
        decisions: &HashMap<String, TriageDecision>,
    ) {
        let Some(mount) = self.mount.clone() else {
            return;
        };

        let first_verified = releases.iter().find(|r| {
            decisions
                .get(&release_key(r))
                .map(|d| d.status == TriageStatus::Verified)
                .unwrap_or(false)
        });
        let Some(release) = first_verified else {
            return;
        };

        let category = if request.plan_type == crate::indexer::PlanType::Series {
            self.config.mount.category_series.clone()
        } else {
            self.config.mount.category_movies.clone()
        };
        let key = MountKey {
            download_url: release_key(release),
            category: category.clone(),
            episode: request
                .episode_pair()
                .map(|(s, e)| format!("s{s:02}e{e:02}")),
        };

        let source = match self.nzb_cache.get(&release_key(release)) {
            Some(cached) => NzbSource::File {
                filename: cached.filename,
                body: cached.body,
            },
            None if !release.download_url.is_empty() => {
                NzbSource::Url(release.download_url.clone())
            }
            None => return,
        };

        let mount_cache = self.mount_cache.clone();
        let episode = request.episode_pair();
        tokio::spawn(async move {
            use futures::FutureExt;
            let result = mount_cache
                .get_or_build(&key, move || {
                    async move { mount.mount(source, &category, episode).await }.boxed()
                })
                .await;
            match result {
                Ok(handle) => debug!(path = %handle.mount_path, "Prefetched mount"),
                Err(e) => debug!(error = %e, "Mount prefetch failed"),
            }
        });
    }
}

/// The triage tag shown as a badge.
fn triage_tag(status: TriageStatus) -> &'static str {
    match status {
        TriageStatus::Verified => "✅",
        TriageStatus::Blocked => "🚫",
        TriageStatus::Pending | TriageStatus::Skipped => "⏱️",
        TriageStatus::Unverified
        | TriageStatus::Unverified7z
        | TriageStatus::FetchError
        | TriageStatus::Error => "⚠️",
    }
}

/// The id as it appeared in the request path (with episode suffix).
fn full_request_id(request: &StreamRequest) -> String {
    match (request.season, request.episode) {
        (Some(season), Some(episode)) => format!("{}:{}:{}", request.id, season, episode),
        _ => request.id.clone(),
    }
}

/// Human-readable size badge.
fn format_size(bytes: u64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else {
        format!("{:.0} MB", bytes / MB)
    }
}
