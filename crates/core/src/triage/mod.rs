//! NZB triage: bounded pre-flight health checks over candidate
//! releases, classifying each as verified / unverified / blocked.

mod analyzer;
mod runner;
mod types;

pub use analyzer::{analyze_nzb, archive_candidates, best_archive, AnalyzerParams};
pub use runner::{synthesize_status, TriageRunner};
pub use types::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("NZB fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid NZB: {0}")]
    InvalidNzb(String),

    #[error("NNTP error: {0}")]
    Nntp(#[from] crate::nntp::NntpError),
}
