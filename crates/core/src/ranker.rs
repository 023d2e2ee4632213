//! Result ranking and deduplication.
//!
//! An ordered pipeline over the raw release list: blocklist, resolution
//! whitelist, size cap, sort, per-resolution cap, windowed dedupe. Every
//! step is deterministic; applying the pipeline twice yields the same
//! ordered list.

use std::collections::HashMap;

use chrono::Duration;

use crate::config::{RankingConfig, SortMode};
use crate::indexer::Release;
use crate::release::{normalize_title, Resolution};

/// Disc images and executables are never streamable.
const BLOCKED_TOKENS: &[&str] = &["iso", "img", "bin", "cue", "exe"];

/// Two releases of the same title published within this window are
/// considered the same upload.
const DEDUPE_WINDOW_DAYS: i64 = 14;

/// Apply the full ranking pipeline.
pub fn rank(releases: Vec<Release>, config: &RankingConfig) -> Vec<Release> {
    let releases = apply_blocklist(releases);
    let releases = apply_resolution_whitelist(releases, config);
    let releases = apply_size_cap(releases, config);
    let releases = sort_releases(releases, config);
    let releases = apply_per_resolution_cap(releases, config);
    if config.dedup_enabled {
        dedupe_releases(releases)
    } else {
        releases
    }
}

/// Drop titles carrying blocked tokens (iso, img, bin, cue, exe).
fn apply_blocklist(releases: Vec<Release>) -> Vec<Release> {
    releases
        .into_iter()
        .filter(|r| {
            !normalize_title(&r.title)
                .split(' ')
                .any(|token| BLOCKED_TOKENS.contains(&token))
        })
        .collect()
}

/// Keep only allowed resolutions. `Unknown` passes only when explicitly
/// listed.
fn apply_resolution_whitelist(releases: Vec<Release>, config: &RankingConfig) -> Vec<Release> {
    let Some(allowed) = &config.allowed_resolutions else {
        return releases;
    };
    releases
        .into_iter()
        .filter(|r| allowed.contains(&r.resolution))
        .collect()
}

/// Drop releases above the configured size cap.
fn apply_size_cap(releases: Vec<Release>, config: &RankingConfig) -> Vec<Release> {
    let Some(max_bytes) = config.max_result_size_bytes else {
        return releases;
    };
    releases
        .into_iter()
        .filter(|r| r.size_bytes <= max_bytes)
        .collect()
}

/// Sort by the configured mode. The sort is stable, so equal keys keep
/// their insertion order.
fn sort_releases(mut releases: Vec<Release>, config: &RankingConfig) -> Vec<Release> {
    match config.sort_mode {
        SortMode::QualityThenSize => {
            releases.sort_by(|a, b| {
                b.quality_score
                    .cmp(&a.quality_score)
                    .then(b.size_bytes.cmp(&a.size_bytes))
            });
        }
        SortMode::LanguageQualitySize => {
            let preferred = &config.preferred_languages;
            releases.sort_by(|a, b| {
                language_bucket(a, preferred)
                    .cmp(&language_bucket(b, preferred))
                    .then(b.quality_score.cmp(&a.quality_score))
                    .then(b.size_bytes.cmp(&a.size_bytes))
            });
        }
    }
    releases
}

/// Bucket index of a release within the preferred-language order; the
/// first matching preference wins, no match sorts last.
fn language_bucket(release: &Release, preferred: &[String]) -> usize {
    preferred
        .iter()
        .position(|lang| {
            release
                .languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(lang))
        })
        .unwrap_or(preferred.len())
}

/// Keep at most K releases per resolution, in post-sort order.
fn apply_per_resolution_cap(releases: Vec<Release>, config: &RankingConfig) -> Vec<Release> {
    let Some(cap) = config.resolution_limit_per_quality else {
        return releases;
    };
    let mut counts: HashMap<Resolution, usize> = HashMap::new();
    releases
        .into_iter()
        .filter(|r| {
            let count = counts.entry(r.resolution).or_insert(0);
            *count += 1;
            *count <= cap
        })
        .collect()
}

/// Deduplicate by normalized title within a 14-day publish window.
///
/// In each collision the paid-indexer release wins; between equals the
/// newer publish instant wins. The surviving release keeps the position
/// of the first one seen, so the output order is insertion-stable.
fn dedupe_releases(releases: Vec<Release>) -> Vec<Release> {
    let mut kept: Vec<Release> = Vec::with_capacity(releases.len());
    let mut by_title: HashMap<String, Vec<usize>> = HashMap::new();
    let window = Duration::days(DEDUPE_WINDOW_DAYS);

    for release in releases {
        let title_key = normalize_title(&release.title);
        let indices = by_title.entry(title_key).or_default();

        let collision = indices.iter().copied().find(|&i| {
            within_window(&kept[i], &release, window)
        });

        match collision {
            Some(i) => {
                if beats(&release, &kept[i]) {
                    kept[i] = release;
                }
            }
            None => {
                indices.push(kept.len());
                kept.push(release);
            }
        }
    }

    kept
}

fn within_window(a: &Release, b: &Release, window: Duration) -> bool {
    let a_ms = a.publish_date.map(|d| d.timestamp_millis()).unwrap_or(0);
    let b_ms = b.publish_date.map(|d| d.timestamp_millis()).unwrap_or(0);
    (a_ms - b_ms).abs() <= window.num_milliseconds()
}

/// Whether `challenger` replaces `incumbent` in a dedupe collision.
fn beats(challenger: &Release, incumbent: &Release) -> bool {
    if challenger.paid != incumbent.paid {
        return challenger.paid;
    }
    let c_ms = challenger
        .publish_date
        .map(|d| d.timestamp_millis())
        .unwrap_or(0);
    let i_ms = incumbent
        .publish_date
        .map(|d| d.timestamp_millis())
        .unwrap_or(0);
    c_ms > i_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::SourceType;
    use chrono::{TimeZone, Utc};

    fn base_config() -> RankingConfig {
        RankingConfig {
            sort_mode: SortMode::QualityThenSize,
            preferred_languages: Vec::new(),
            max_result_size_bytes: None,
            allowed_resolutions: None,
            resolution_limit_per_quality: None,
            dedup_enabled: true,
            hide_blocked_results: false,
        }
    }

    fn release(title: &str, size_gb: u64, days_ago: i64, paid: bool) -> Release {
        Release::new(
            title.to_string(),
            format!("https://x/get/{title}/{size_gb}/{paid}"),
            if paid { "paid-indexer" } else { "free-indexer" }.to_string(),
            if paid { "paid-indexer" } else { "free-indexer" }.to_string(),
            size_gb * 1024 * 1024 * 1024,
            Some(Utc::now() - Duration::days(days_ago)),
            SourceType::Direct,
            paid,
        )
    }

    #[test]
    fn test_blocklist_drops_disc_images() {
        let releases = vec![
            release("Movie.2023.1080p.WEB", 5, 1, false),
            release("Movie.2023.ISO.Full", 40, 1, false),
            release("Movie.2023.BIN.CUE", 8, 1, false),
        ];
        let ranked = rank(releases, &base_config());
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].title.contains("WEB"));
    }

    #[test]
    fn test_resolution_whitelist_excludes_unknown_by_default() {
        let mut config = base_config();
        config.allowed_resolutions = Some(vec![Resolution::R1080p]);
        let releases = vec![
            release("Movie.1080p", 5, 1, false),
            release("Movie.720p", 2, 1, false),
            release("Movie.NoRes", 3, 1, false),
        ];
        let ranked = rank(releases, &config);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].resolution, Resolution::R1080p);
    }

    #[test]
    fn test_resolution_whitelist_admits_unknown_when_listed() {
        let mut config = base_config();
        config.allowed_resolutions = Some(vec![Resolution::R1080p, Resolution::Unknown]);
        let releases = vec![
            release("Movie.1080p", 5, 1, false),
            release("Movie.NoRes", 3, 1, false),
        ];
        assert_eq!(rank(releases, &config).len(), 2);
    }

    #[test]
    fn test_size_cap() {
        let mut config = base_config();
        config.max_result_size_bytes = Some(10 * 1024 * 1024 * 1024);
        let releases = vec![
            release("Movie.Remux.1080p", 40, 1, false),
            release("Movie.WEB.1080p", 5, 1, false),
        ];
        let ranked = rank(releases, &config);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].title.contains("WEB"));
    }

    #[test]
    fn test_quality_then_size_sort() {
        let releases = vec![
            release("B.720p", 9, 1, false),
            release("A.1080p.small", 4, 2, false),
            release("A.1080p.big", 8, 3, false),
        ];
        let ranked = rank(releases, &base_config());
        let titles: Vec<&str> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A.1080p.big", "A.1080p.small", "B.720p"]);
    }

    #[test]
    fn test_language_preference_sort() {
        let mut config = base_config();
        config.sort_mode = SortMode::LanguageQualitySize;
        config.preferred_languages = vec!["Tamil".to_string()];
        let releases = vec![
            release("Movie.2023.2160p.English.WEB", 10, 1, false),
            release("Movie.2023.1080p.Tamil.WEB", 4, 1, false),
        ];
        let ranked = rank(releases, &config);
        // The Tamil release sorts first despite lower quality.
        assert!(ranked[0].title.contains("Tamil"));
        assert!(ranked[1].title.contains("English"));
    }

    #[test]
    fn test_language_buckets_follow_preference_order() {
        let mut config = base_config();
        config.sort_mode = SortMode::LanguageQualitySize;
        config.preferred_languages = vec!["Hindi".to_string(), "Tamil".to_string()];
        let releases = vec![
            release("Movie.Tamil.1080p", 5, 1, false),
            release("Movie.Hindi.720p", 3, 1, false),
            release("Movie.English.2160p", 9, 1, false),
        ];
        let ranked = rank(releases, &config);
        assert!(ranked[0].title.contains("Hindi"));
        assert!(ranked[1].title.contains("Tamil"));
        assert!(ranked[2].title.contains("English"));
    }

    #[test]
    fn test_per_resolution_cap() {
        let mut config = base_config();
        config.resolution_limit_per_quality = Some(1);
        let releases = vec![
            release("A.1080p", 8, 1, false),
            release("B.1080p", 5, 2, false),
            release("C.720p", 3, 1, false),
        ];
        let ranked = rank(releases, &config);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].title, "A.1080p");
        assert_eq!(ranked[1].title, "C.720p");
    }

    #[test]
    fn test_dedupe_paid_wins_within_window() {
        let releases = vec![
            release("Movie.2023.1080p.WEB", 5, 5, false),
            release("Movie.2023.1080p.WEB", 5, 3, true),
        ];
        let ranked = rank(releases, &base_config());
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].paid, "paid release wins the collision");
    }

    #[test]
    fn test_dedupe_newer_wins_between_equals() {
        let old = release("Movie.2023.1080p.WEB", 5, 10, false);
        let new = release("Movie.2023.1080p.WEB", 5, 1, false);
        let old_date = old.publish_date;
        let ranked = rank(vec![old, new], &base_config());
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].publish_date > old_date);
    }

    #[test]
    fn test_dedupe_outside_window_keeps_both() {
        let releases = vec![
            release("Movie.2023.1080p.WEB", 5, 60, false),
            release("Movie.2023.1080p.WEB", 5, 1, false),
        ];
        let ranked = rank(releases, &base_config());
        assert_eq!(ranked.len(), 2, "60 days apart is two distinct uploads");
    }

    #[test]
    fn test_dedupe_disabled_keeps_duplicates() {
        let mut config = base_config();
        config.dedup_enabled = false;
        let releases = vec![
            release("Movie.2023.1080p.WEB", 5, 5, false),
            release("Movie.2023.1080p.WEB", 5, 3, true),
        ];
        assert_eq!(rank(releases, &config).len(), 2);
    }

    #[test]
    fn test_pipeline_idempotent() {
        let mut config = base_config();
        config.sort_mode = SortMode::LanguageQualitySize;
        config.preferred_languages = vec!["Tamil".to_string()];
        config.resolution_limit_per_quality = Some(2);

        let releases = vec![
            release("A.2160p.Tamil", 10, 1, false),
            release("B.1080p", 5, 2, true),
            release("C.1080p", 4, 3, false),
            release("D.720p.Tamil", 2, 4, false),
            release("E.Unknown", 1, 5, false),
        ];

        let once = rank(releases, &config);
        let twice = rank(once.clone(), &config);
        let once_titles: Vec<&str> = once.iter().map(|r| r.title.as_str()).collect();
        let twice_titles: Vec<&str> = twice.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(once_titles, twice_titles);
    }

    #[test]
    fn test_paid_free_collision_three_days_apart() {
        // 5 GB paid and 5.2 GB free, published 3 days apart: paid wins.
        let paid = Release::new(
            "Movie.2023.1080p.BluRay".to_string(),
            "https://paid/get/1".to_string(),
            "paid-indexer".to_string(),
            "paid-indexer".to_string(),
            5 * 1024 * 1024 * 1024,
            Some(Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap()),
            SourceType::Direct,
            true,
        );
        let free = Release::new(
            "Movie 2023 1080p BluRay".to_string(),
            "https://free/get/1".to_string(),
            "free-indexer".to_string(),
            "free-indexer".to_string(),
            (5.2 * 1024.0 * 1024.0 * 1024.0 * 1024.0 / 1024.0) as u64,
            Some(Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()),
            SourceType::Direct,
            false,
        );
        let ranked = rank(vec![free, paid], &base_config());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].indexer_id, "paid-indexer");
    }
}
