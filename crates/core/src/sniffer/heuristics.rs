//! Filename-token heuristics over raw archive bytes.
//!
//! Archive headers embed member names as plain bytes; even when the
//! structural walk fails, the names are usually visible. The bytes are
//! read as latin-1 and scanned for filename-shaped tokens.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Nested archive volumes: plain .rar, .partNN.rar, .rNN splits, .7z, .zip.
static NESTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-z0-9_\-]+(?:\.part\d+)?\.(?:rar|r\d{2}|7z|zip)\b")
        .expect("nested regex is valid")
});

/// Playable video files.
static VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-z0-9_\-]+\.(?:mkv|mp4|mov|avi|ts|m4v|mpg|mpeg|wmv|flv|webm)\b")
        .expect("video regex is valid")
});

/// Count (nested-archive names, playable-video names) in the bytes.
pub fn scan_filename_tokens(data: &[u8]) -> (usize, usize) {
    // Latin-1: every byte maps to exactly one char, names survive.
    let text: String = data.iter().map(|&b| b as char).collect();

    let nested = NESTED_RE.find_iter(&text).count();
    let video = VIDEO_RE.find_iter(&text).count();
    (nested, video)
}
