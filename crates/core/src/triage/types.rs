//! Triage decision types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::indexer::Release;
use crate::nntp::PoolMetrics;
use crate::release::normalize_title;

/// Final and transitional states of a triaged candidate.
///
/// A decision only ever moves toward a final status (`verified`,
/// `blocked`, `unverified_7z`) and never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageStatus {
    Verified,
    Unverified,
    #[serde(rename = "unverified_7z")]
    Unverified7z,
    Blocked,
    FetchError,
    Error,
    Pending,
    Skipped,
}

impl TriageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TriageStatus::Verified => "verified",
            TriageStatus::Unverified => "unverified",
            TriageStatus::Unverified7z => "unverified_7z",
            TriageStatus::Blocked => "blocked",
            TriageStatus::FetchError => "fetch-error",
            TriageStatus::Error => "error",
            TriageStatus::Pending => "pending",
            TriageStatus::Skipped => "skipped",
        }
    }

    /// Final statuses are never re-evaluated.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TriageStatus::Verified | TriageStatus::Blocked | TriageStatus::Unverified7z
        )
    }
}

/// Tokens that block a candidate outright.
pub fn is_blocker_token(token: &str) -> bool {
    matches!(
        token,
        "rar-compressed"
            | "rar-encrypted"
            | "rar-solid"
            | "rar5-unsupported"
            | "rar-nested-archive"
            | "sevenzip-nested-archive"
            | "sevenzip-unsupported"
            | "missing-articles"
    )
}

/// Tokens that positively confirm streamability.
pub fn is_success_token(token: &str) -> bool {
    matches!(token, "rar-stored" | "sevenzip-stored" | "segment-ok")
}

/// The verdict on one candidate, keyed by its download URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageDecision {
    pub status: TriageStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blockers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Archive findings, success tokens included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<String>,
    pub file_count: usize,
    pub title: String,
    pub normalized_title: String,
    pub indexer_id: String,
    pub indexer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    pub age_days: u32,
    /// The fetched NZB body, carried on verified decisions so the
    /// orchestrator can cache it without a second download.
    #[serde(skip)]
    pub nzb_body: Option<String>,
}

impl TriageDecision {
    /// A decision shell for a candidate with the given status.
    pub fn for_release(release: &Release, status: TriageStatus) -> Self {
        Self {
            status,
            blockers: Vec::new(),
            warnings: Vec::new(),
            findings: Vec::new(),
            file_count: 0,
            title: release.title.clone(),
            normalized_title: normalize_title(&release.title),
            indexer_id: release.indexer_id.clone(),
            indexer_name: release.indexer_name.clone(),
            publish_date: release.publish_date,
            age_days: release.age_days,
            nzb_body: None,
        }
    }
}

/// Run-level accounting returned with the decisions.
#[derive(Debug, Clone, Serialize)]
pub struct TriageSummary {
    /// Count per status label.
    pub counts: HashMap<String, usize>,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolMetrics>,
}

/// Everything a triage run produces.
#[derive(Debug)]
pub struct TriageOutcome {
    /// Decisions keyed by [`release_key`].
    pub decisions: HashMap<String, TriageDecision>,
    pub summary: TriageSummary,
}

/// The decision-map key for a release: its download URL, or a token
/// pseudo-URL for Easynews results that have none.
pub fn release_key(release: &Release) -> String {
    if !release.download_url.is_empty() {
        release.download_url.clone()
    } else {
        format!(
            "easynews:{}",
            release.payload_token.as_deref().unwrap_or_default()
        )
    }
}
