//! Archive sniffing.
//!
//! Classifies the head of a decoded article as RAR4 / RAR5 / 7z and
//! decides whether the archive is directly streamable (stored), or a
//! blocker (compressed, encrypted, solid, nested). A filename-token
//! heuristic runs over the raw bytes regardless of the structural
//! result and can upgrade the status to nested-archive.

mod heuristics;
mod rar;
mod sevenz;

pub use heuristics::scan_filename_tokens;
pub use rar::{sniff_rar4, sniff_rar5};
pub use sevenz::sniff_sevenz;

/// Only this much of a decoded segment is ever inspected.
pub const MAX_SNIFF_BYTES: usize = 256 * 1024;

pub const RAR4_MAGIC: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];
pub const RAR5_MAGIC: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];
pub const SEVENZ_MAGIC: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Extensions that play directly.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".mov", ".avi", ".ts", ".m4v", ".mpg", ".mpeg", ".wmv", ".flv", ".webm",
];

/// Extensions that mean "another archive inside".
pub const NESTED_ARCHIVE_EXTENSIONS: &[&str] = &[".rar", ".7z", ".zip"];

/// Structural classification of a sniffed archive head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveStatus {
    RarStored,
    RarCompressed,
    RarEncrypted,
    RarSolid,
    RarNestedArchive,
    Rar5Unsupported,
    RarHeaderNotFound,
    SevenZipStored,
    SevenZipUnsupported,
    SevenZipNestedArchive,
    SevenZipUntested,
}

impl ArchiveStatus {
    /// The token used in triage decisions.
    pub fn label(&self) -> &'static str {
        match self {
            ArchiveStatus::RarStored => "rar-stored",
            ArchiveStatus::RarCompressed => "rar-compressed",
            ArchiveStatus::RarEncrypted => "rar-encrypted",
            ArchiveStatus::RarSolid => "rar-solid",
            ArchiveStatus::RarNestedArchive => "rar-nested-archive",
            ArchiveStatus::Rar5Unsupported => "rar5-unsupported",
            ArchiveStatus::RarHeaderNotFound => "rar-header-not-found",
            ArchiveStatus::SevenZipStored => "sevenzip-stored",
            ArchiveStatus::SevenZipUnsupported => "sevenzip-unsupported",
            ArchiveStatus::SevenZipNestedArchive => "sevenzip-nested-archive",
            ArchiveStatus::SevenZipUntested => "sevenzip-untested",
        }
    }

    fn is_sevenz(&self) -> bool {
        matches!(
            self,
            ArchiveStatus::SevenZipStored
                | ArchiveStatus::SevenZipUnsupported
                | ArchiveStatus::SevenZipNestedArchive
                | ArchiveStatus::SevenZipUntested
        )
    }
}

/// The sniffer's verdict on one decoded head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffResult {
    pub status: ArchiveStatus,
    /// Filenames seen in structural headers.
    pub entries: Vec<String>,
    /// Nested-archive-shaped names found by the byte heuristic.
    pub nested_names: usize,
    /// Playable-video-shaped names found by the byte heuristic.
    pub video_names: usize,
    /// Soft findings that did not change the status.
    pub caveats: Vec<String>,
}

/// Sniff a decoded segment head. Deterministic for identical bytes.
pub fn sniff(data: &[u8]) -> SniffResult {
    let head = &data[..data.len().min(MAX_SNIFF_BYTES)];

    let mut result = if head.starts_with(&RAR5_MAGIC) {
        sniff_rar5(head)
    } else if head.starts_with(&RAR4_MAGIC) {
        sniff_rar4(head)
    } else if head.starts_with(&SEVENZ_MAGIC) {
        sniff_sevenz(head)
    } else {
        SniffResult {
            status: ArchiveStatus::RarHeaderNotFound,
            entries: Vec::new(),
            nested_names: 0,
            video_names: 0,
            caveats: Vec::new(),
        }
    };

    // Heuristic overlay: filename-shaped tokens in the raw bytes. When
    // at least one nested archive name appears and no playable video
    // does, the payload is an archive-in-archive whatever the headers
    // claimed.
    let (nested, video) = scan_filename_tokens(head);
    result.nested_names = nested;
    result.video_names = video;
    if nested >= 1 && video == 0 {
        result.status = if result.status.is_sevenz() {
            ArchiveStatus::SevenZipNestedArchive
        } else {
            ArchiveStatus::RarNestedArchive
        };
    }

    result
}
