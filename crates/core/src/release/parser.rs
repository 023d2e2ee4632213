//! Resolution detection and release parsing.

use super::languages::detect_languages;
use super::types::{ParsedRelease, Resolution};

/// Parse a release title into resolution, languages and quality score.
///
/// Idempotent and free of I/O; safe to call on every raw indexer item.
pub fn parse_release(title: &str) -> ParsedRelease {
    let resolution = detect_resolution(title);
    let languages = detect_languages(title);

    ParsedRelease {
        resolution,
        languages,
        quality_label: resolution.label().to_string(),
        quality_score: resolution.rank(),
    }
}

/// Detect the resolution of a release title.
///
/// Numeric tokens ("2160p", "1080p", ...) win over aliases ("4k", "uhd",
/// "fullhd", "sd"); anything else is `Unknown`.
pub fn detect_resolution(title: &str) -> Resolution {
    let tokens = tokenize(title);

    for token in &tokens {
        if let Some(res) = numeric_resolution(token) {
            return res;
        }
    }

    for token in &tokens {
        if let Some(res) = alias_resolution(token) {
            return res;
        }
    }

    Resolution::Unknown
}

/// Normalize a title for dedupe and matching.
///
/// Lowercase, `.`/`_`/`-` become spaces, quotes and any bracketing are
/// stripped, remaining non-alphanumerics dropped, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        match c {
            '.' | '_' | '-' => out.push(' '),
            '\'' | '"' | '`' => {}
            '[' | ']' | '(' | ')' | '{' | '}' => {}
            c if c.is_ascii_alphanumeric() => out.push(c),
            c if c.is_whitespace() => out.push(' '),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a title into lowercase alphanumeric tokens.
pub(crate) fn tokenize(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn numeric_resolution(token: &str) -> Option<Resolution> {
    // Only tokens in the closed label set count; "1081p" stays unknown.
    if token.ends_with('p') {
        return Resolution::from_label(token).filter(|r| *r != Resolution::Unknown);
    }
    None
}

fn alias_resolution(token: &str) -> Option<Resolution> {
    match token {
        "4k" => Some(Resolution::R2160p),
        "8k" => Some(Resolution::R4320p),
        "uhd" => Some(Resolution::R2160p),
        "fullhd" => Some(Resolution::R1080p),
        "sd" => Some(Resolution::R480p),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_resolutions() {
        assert_eq!(
            detect_resolution("Movie.2023.2160p.WEB-DL"),
            Resolution::R2160p
        );
        assert_eq!(
            detect_resolution("Movie 2023 1080p BluRay x264"),
            Resolution::R1080p
        );
        assert_eq!(detect_resolution("Show.S01E02.720p.HDTV"), Resolution::R720p);
        assert_eq!(detect_resolution("Old.Film.1951.480p"), Resolution::R480p);
        assert_eq!(detect_resolution("PAL.Rip.576p"), Resolution::R576p);
    }

    #[test]
    fn test_aliases() {
        assert_eq!(detect_resolution("Movie.2023.4K.HDR"), Resolution::R2160p);
        assert_eq!(detect_resolution("Demo.8k.content"), Resolution::R4320p);
        assert_eq!(detect_resolution("Movie.UHD.BluRay"), Resolution::R2160p);
        assert_eq!(detect_resolution("Movie.FullHD.WEB"), Resolution::R1080p);
        assert_eq!(detect_resolution("Movie.SD.DVDRip"), Resolution::R480p);
    }

    #[test]
    fn test_numeric_beats_alias() {
        // Both present: the explicit numeric token wins.
        assert_eq!(
            detect_resolution("Movie.4K.2160p.Remux"),
            Resolution::R2160p
        );
        assert_eq!(detect_resolution("Movie.UHD.1080p"), Resolution::R1080p);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(detect_resolution("Movie.2023.WEB-DL.x264"), Resolution::Unknown);
        assert_eq!(detect_resolution(""), Resolution::Unknown);
        // Not in the closed label set.
        assert_eq!(detect_resolution("Movie.1081p.WEB"), Resolution::Unknown);
    }

    #[test]
    fn test_year_is_not_resolution() {
        assert_eq!(detect_resolution("Movie.1080.BluRay"), Resolution::Unknown);
        assert_eq!(detect_resolution("2160 Leagues Under The Sea"), Resolution::Unknown);
    }

    #[test]
    fn test_all_titles_stay_in_closed_set() {
        let titles = [
            "Movie.2023.2160p.WEB",
            "Movie 4k",
            "garbage title",
            "1080p1080p",
            "Show S01E01 540p",
            "weird.360p.cam",
            "ancient.240p.rip",
            "Movie.1440p.WEB",
        ];
        for title in titles {
            let parsed = parse_release(title);
            assert!(
                Resolution::ORDERED.contains(&parsed.resolution),
                "resolution for {title:?} escaped the closed set"
            );
            assert_eq!(parsed.quality_score, parsed.resolution.rank());
            assert_eq!(parsed.quality_label, parsed.resolution.label());
        }
    }

    #[test]
    fn test_quality_score_monotonic_in_rank() {
        let hi = parse_release("Movie.2160p");
        let mid = parse_release("Movie.1080p");
        let lo = parse_release("Movie.480p");
        let unknown = parse_release("Movie");
        assert!(hi.quality_score > mid.quality_score);
        assert!(mid.quality_score > lo.quality_score);
        assert!(lo.quality_score > unknown.quality_score);
        assert_eq!(unknown.quality_score, 0);
    }

    #[test]
    fn test_parse_release_languages() {
        let parsed = parse_release("Movie.2023.1080p.Tamil.WEB");
        assert_eq!(parsed.languages, vec!["Tamil".to_string()]);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("The.Shawshank_Redemption-1994"),
            "the shawshank redemption 1994"
        );
        assert_eq!(normalize_title("Movie [2023] (WEB)"), "movie 2023 web");
        assert_eq!(normalize_title("  It's  \"Quoted\"  "), "its quoted");
        assert_eq!(normalize_title("Ünïcode!"), "ncode");
    }

    #[test]
    fn test_normalize_title_idempotent() {
        let once = normalize_title("Some.Movie.2023.1080p [x264] {group}");
        assert_eq!(normalize_title(&once), once);
    }
}
