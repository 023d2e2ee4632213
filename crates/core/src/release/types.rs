//! Types for release-title parsing.

use serde::{Deserialize, Serialize};

/// Video resolution detected from a release title.
///
/// The variant order is the quality order; `rank()` exposes it as a number
/// so callers can sort without caring about the enum layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Unknown,
    #[serde(rename = "240p")]
    R240p,
    #[serde(rename = "360p")]
    R360p,
    #[serde(rename = "480p")]
    R480p,
    #[serde(rename = "540p")]
    R540p,
    #[serde(rename = "576p")]
    R576p,
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "1080p")]
    R1080p,
    #[serde(rename = "1440p")]
    R1440p,
    #[serde(rename = "2160p")]
    R2160p,
    #[serde(rename = "4320p")]
    R4320p,
}

impl Resolution {
    /// All known resolutions, lowest to highest quality.
    pub const ORDERED: [Resolution; 11] = [
        Resolution::Unknown,
        Resolution::R240p,
        Resolution::R360p,
        Resolution::R480p,
        Resolution::R540p,
        Resolution::R576p,
        Resolution::R720p,
        Resolution::R1080p,
        Resolution::R1440p,
        Resolution::R2160p,
        Resolution::R4320p,
    ];

    /// Quality rank, higher is better. `Unknown` ranks 0.
    pub fn rank(&self) -> u32 {
        Self::ORDERED
            .iter()
            .position(|r| r == self)
            .unwrap_or(0) as u32
    }

    /// The label used in titles and API responses ("1080p", "unknown", ...).
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Unknown => "unknown",
            Resolution::R240p => "240p",
            Resolution::R360p => "360p",
            Resolution::R480p => "480p",
            Resolution::R540p => "540p",
            Resolution::R576p => "576p",
            Resolution::R720p => "720p",
            Resolution::R1080p => "1080p",
            Resolution::R1440p => "1440p",
            Resolution::R2160p => "2160p",
            Resolution::R4320p => "4320p",
        }
    }

    /// Parse a label like "1080p" back into a resolution.
    pub fn from_label(label: &str) -> Option<Resolution> {
        Self::ORDERED
            .iter()
            .copied()
            .find(|r| r.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything extracted from a single release title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRelease {
    /// Detected resolution, `Unknown` when nothing matched.
    pub resolution: Resolution,
    /// Languages whose synonym tokens appear in the title.
    pub languages: Vec<String>,
    /// Display label for the quality ("1080p" etc.).
    pub quality_label: String,
    /// Quality score derived from the resolution rank.
    pub quality_score: u32,
}
