//! Search planning.
//!
//! Converts a request identifier plus resolved metadata into an ordered,
//! identity-deduplicated set of search plans. Id-based plans need no
//! metadata and can be dispatched while metadata resolution is still in
//! flight; text plans follow once titles are known.

use std::collections::HashSet;

use crate::indexer::{sanitize_query, PlanTokens, PlanType, SearchPlan};

/// The identifiers a stream request carries before metadata resolution.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub plan_type: PlanType,
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// Title material resolved by the metadata provider.
#[derive(Debug, Clone, Default)]
pub struct TitleCandidates {
    /// The primary (usually English) title.
    pub primary: Option<String>,
    /// The original-language title, when different from the primary.
    pub original: Option<String>,
    /// Additional localized titles.
    pub localized: Vec<String>,
    pub year: Option<u32>,
}

/// Plans that can be dispatched immediately from ids alone.
///
/// Order: TVDB token plan for series, then an IMDb token plan when no
/// TVDB variant was emitted.
pub fn id_plans(request: &PlanRequest) -> Vec<SearchPlan> {
    let mut plans = Vec::new();

    if request.plan_type == PlanType::Series {
        if let Some(tvdb_id) = request.tvdb_id {
            plans.push(SearchPlan {
                plan_type: PlanType::Series,
                query: String::new(),
                tokens: PlanTokens {
                    tvdb_id: Some(tvdb_id),
                    season: request.season,
                    episode: request.episode,
                    ..Default::default()
                },
                strict_phrase: None,
            });
        }
    }

    if plans.is_empty() {
        if let Some(imdb_id) = &request.imdb_id {
            plans.push(SearchPlan {
                plan_type: request.plan_type,
                query: String::new(),
                tokens: PlanTokens {
                    imdb_id: Some(imdb_id.clone()),
                    season: request.season,
                    episode: request.episode,
                    ..Default::default()
                },
                strict_phrase: None,
            });
        }
    }

    plans
}

/// Text plans built after metadata resolution.
///
/// The primary title yields one plan with a strict phrase; every
/// additional ASCII-safe localized title yields one more. Non-ASCII
/// titles are dropped (they produce false matches in fuzzy Newznab
/// search) unless an ASCII alias exists among the candidates.
pub fn text_plans(request: &PlanRequest, titles: &TitleCandidates) -> Vec<SearchPlan> {
    let mut plans = Vec::new();

    if let Some(primary) = titles.primary.as_deref().filter(|t| is_ascii_safe(t)) {
        plans.push(text_plan(request, primary, titles.year));
    }

    for localized in &titles.localized {
        if is_ascii_safe(localized) {
            plans.push(text_plan(request, localized, titles.year));
        }
    }

    dedupe_plans(plans)
}

/// One extra dispatch when everything else came back empty and an
/// ASCII-safe alternate original title is known.
pub fn fallback_plan(request: &PlanRequest, titles: &TitleCandidates) -> Option<SearchPlan> {
    let original = titles.original.as_deref()?;
    if !is_ascii_safe(original) {
        return None;
    }
    // Only useful when it differs from the primary text plan.
    if titles
        .primary
        .as_deref()
        .is_some_and(|p| sanitize_query(p).eq_ignore_ascii_case(&sanitize_query(original)))
    {
        return None;
    }
    Some(text_plan(request, original, titles.year))
}

/// Deduplicate plans by (type, canonical query), preserving order.
pub fn dedupe_plans(plans: Vec<SearchPlan>) -> Vec<SearchPlan> {
    let mut seen = HashSet::new();
    plans
        .into_iter()
        .filter(|plan| seen.insert(plan.identity()))
        .collect()
}

fn text_plan(request: &PlanRequest, title: &str, year: Option<u32>) -> SearchPlan {
    let sanitized = sanitize_query(title);

    let query = match (request.plan_type, request.season, request.episode) {
        (PlanType::Series, Some(season), Some(episode)) => {
            format!("{sanitized} S{season:02}E{episode:02}")
        }
        (PlanType::Movie, _, _) | (PlanType::Search, _, _) => match year {
            Some(year) => format!("{sanitized} {year}"),
            None => sanitized.clone(),
        },
        _ => sanitized.clone(),
    };

    SearchPlan {
        plan_type: request.plan_type,
        query,
        tokens: PlanTokens {
            season: request.season,
            episode: request.episode,
            ..Default::default()
        },
        strict_phrase: Some(sanitized),
    }
}

/// A title is ASCII-safe when every char is ASCII and at least one is
/// alphanumeric.
pub fn is_ascii_safe(title: &str) -> bool {
    title.is_ascii() && title.chars().any(|c| c.is_ascii_alphanumeric())
}
