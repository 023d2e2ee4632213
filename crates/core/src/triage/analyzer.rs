//! Per-NZB health analysis.
//!
//! Parses the NZB, picks the most telling archive volume, STATs a
//! sample of segments and sniffs one decoded body. Produces the token
//! lists the decision synthesis turns into a status.

use std::collections::HashMap;
use std::time::Instant;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::nntp::{NntpPool, StatOutcome};
use crate::nzb::{parse_nzb, NzbDocument, NzbFile};
use crate::sniffer::{sniff, MAX_SNIFF_BYTES};

use super::TriageError;

/// What the analyzer learned about one NZB.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub findings: Vec<String>,
    pub blockers: Vec<String>,
    pub warnings: Vec<String>,
    pub file_count: usize,
}

impl AnalysisReport {
    fn push_finding(&mut self, token: &str) {
        if super::is_blocker_token(token) {
            self.blockers.push(token.to_string());
        } else if super::is_success_token(token) {
            self.findings.push(token.to_string());
        } else {
            self.warnings.push(token.to_string());
        }
    }
}

/// Analyzer parameters, lifted from the triage config.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerParams {
    pub stat_sample_count: usize,
    pub archive_sample_count: usize,
}

/// Analyze one NZB payload against the article server.
///
/// The deadline bounds sampling: once it passes, no further NNTP call
/// is started, and what was gathered so far stands.
pub async fn analyze_nzb(
    pool: &NntpPool,
    nzb_xml: &str,
    params: AnalyzerParams,
    deadline: Instant,
) -> Result<AnalysisReport, TriageError> {
    let document = parse_nzb(nzb_xml).map_err(|e| TriageError::InvalidNzb(e.to_string()))?;

    let mut report = AnalysisReport {
        file_count: document.files.len(),
        ..Default::default()
    };

    let archives = archive_candidates(&document);

    if archives.is_empty() {
        report.push_finding("no-archive-candidates");
        let all_files: Vec<&NzbFile> = document.files.iter().collect();
        let present =
            stat_sample(pool, &all_files, params.stat_sample_count, deadline, &mut report)
                .await?;
        if report.blockers.is_empty() && present > 0 {
            report.push_finding("segment-ok");
        }
        return Ok(report);
    }

    let best = best_archive(&archives);

    if let Some(first_segment) = best.segments.first() {
        if Instant::now() < deadline {
            let mut client = pool.acquire().await?;
            match client.stat(&first_segment.message_id).await {
                Ok(StatOutcome::Missing) => {
                    report.push_finding("missing-articles");
                }
                Ok(StatOutcome::Present) => {
                    if best.extension == ".7z" {
                        // 7z headers live at the end of the archive;
                        // the first segment proves existence only.
                        report.push_finding("sevenzip-untested");
                    } else if Instant::now() < deadline {
                        match client
                            .body_decoded(&first_segment.message_id, MAX_SNIFF_BYTES)
                            .await
                        {
                            Ok(Some(decoded)) => {
                                let sniffed = sniff(&decoded);
                                debug!(
                                    status = sniffed.status.label(),
                                    nested = sniffed.nested_names,
                                    video = sniffed.video_names,
                                    "Archive sniff complete"
                                );
                                report.push_finding(sniffed.status.label());
                                for caveat in sniffed.caveats {
                                    report.warnings.push(caveat);
                                }
                            }
                            Ok(None) => report.push_finding("missing-articles"),
                            Err(e) if e.is_transport_error() => {
                                report.warnings.push(format!("nntp-transport: {e}"));
                            }
                            Err(e) => {
                                report.warnings.push(format!("body-fetch: {e}"));
                            }
                        }
                    }
                }
                Err(e) if e.is_transport_error() => {
                    report.warnings.push(format!("nntp-transport: {e}"));
                }
                Err(e) => return Err(TriageError::Nntp(e)),
            }
        }
    }

    // Spot-check segments across the other archive volumes.
    let other_files: Vec<&NzbFile> = archives
        .iter()
        .copied()
        .filter(|f| !std::ptr::eq(*f, best))
        .take(params.archive_sample_count)
        .collect();
    stat_sample(pool, &other_files, params.stat_sample_count, deadline, &mut report).await?;

    Ok(report)
}

/// Files that look like archive volumes, deduplicated by canonical
/// base name so `name.part01.rar` and `name.r00` collapse to one
/// candidate set per archive.
pub fn archive_candidates(document: &NzbDocument) -> Vec<&NzbFile> {
    let mut by_base: HashMap<String, &NzbFile> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for file in &document.files {
        if !is_archive_extension(&file.extension) {
            continue;
        }
        let base = canonical_archive_base(&file.filename);
        if !by_base.contains_key(&base) {
            order.push(base.clone());
            by_base.insert(base, file);
        } else if archive_score(&file.filename) > archive_score(&by_base[&base].filename) {
            by_base.insert(base, file);
        }
    }

    order.into_iter().map(|base| by_base[&base]).collect()
}

/// The most telling volume: `.rar` beats `.r00` beats `.partNN.rar`;
/// proof, sample and nfo material is penalized.
pub fn best_archive<'a>(archives: &[&'a NzbFile]) -> &'a NzbFile {
    archives
        .iter()
        .copied()
        .max_by_key(|f| archive_score(&f.filename))
        .expect("best_archive called with candidates")
}

fn archive_score(filename: &str) -> i32 {
    let lower = filename.to_lowercase();
    let mut score = 0;

    if lower.ends_with(".rar") {
        if lower.contains(".part") {
            score += 40;
        } else {
            score += 100;
        }
    } else if has_rnn_extension(&lower) {
        score += 60;
    } else if lower.ends_with(".7z") || lower.ends_with(".zip") {
        score += 50;
    }

    for junk in ["proof", "sample", "nfo"] {
        if lower.contains(junk) {
            score -= 200;
        }
    }

    score
}

fn is_archive_extension(extension: &str) -> bool {
    if matches!(extension, ".rar" | ".7z" | ".zip") {
        return true;
    }
    has_rnn_extension(extension)
}

fn has_rnn_extension(name: &str) -> bool {
    name.len() >= 4
        && name[name.len() - 4..].starts_with(".r")
        && name[name.len() - 2..].chars().all(|c| c.is_ascii_digit())
}

/// Strip split-volume numbering to the canonical `.rar` base.
fn canonical_archive_base(filename: &str) -> String {
    let lower = filename.to_lowercase();

    if has_rnn_extension(&lower) {
        return format!("{}.rar", &lower[..lower.len() - 4]);
    }
    if let Some(stem) = lower.strip_suffix(".rar") {
        if let Some(part_idx) = stem.rfind(".part") {
            let digits = &stem[part_idx + 5..];
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return format!("{}.rar", &stem[..part_idx]);
            }
        }
    }
    lower
}

/// STAT up to `sample_count` randomly chosen unique segments across
/// the given files; missing articles become blockers. Returns how many
/// articles answered present.
async fn stat_sample(
    pool: &NntpPool,
    files: &[&NzbFile],
    sample_count: usize,
    deadline: Instant,
    report: &mut AnalysisReport,
) -> Result<usize, TriageError> {
    let unique: std::collections::HashSet<&str> = files
        .iter()
        .flat_map(|f| f.segments.iter())
        .map(|s| s.message_id.as_str())
        .collect();
    let mut message_ids: Vec<&str> = unique.into_iter().collect();
    if message_ids.is_empty() || sample_count == 0 {
        return Ok(0);
    }

    message_ids.shuffle(&mut rand::thread_rng());
    message_ids.truncate(sample_count);

    let mut present = 0usize;
    let mut client = pool.acquire().await?;
    for message_id in message_ids {
        if Instant::now() >= deadline {
            break;
        }
        match client.stat(message_id).await {
            Ok(StatOutcome::Present) => present += 1,
            Ok(StatOutcome::Missing) => {
                report.push_finding("missing-articles");
                break;
            }
            Err(e) if e.is_transport_error() => {
                report.warnings.push(format!("nntp-transport: {e}"));
                break;
            }
            Err(e) => return Err(TriageError::Nntp(e)),
        }
    }

    Ok(present)
}
