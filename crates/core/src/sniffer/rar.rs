//! RAR4 and RAR5 header walking.

use super::{
    ArchiveStatus, SniffResult, NESTED_ARCHIVE_EXTENSIONS, RAR4_MAGIC, RAR5_MAGIC,
    VIDEO_EXTENSIONS,
};

/// RAR4 file-header flag: contents encrypted.
const RAR4_FLAG_ENCRYPTED: u16 = 0x0004;
/// RAR4 file-header flag: solid compression.
const RAR4_FLAG_SOLID: u16 = 0x0010;
/// RAR4 file-header flag: 64-bit pack/unpack sizes present.
const RAR4_FLAG_LARGE: u16 = 0x0100;
/// RAR4 block flag: ADD_SIZE field present.
const RAR4_FLAG_LONG_BLOCK: u16 = 0x8000;
/// RAR4 main-header flag: block headers encrypted.
const RAR4_MAIN_FLAG_PASSWORD: u16 = 0x0080;

/// Store method byte in both RAR formats.
const METHOD_STORE: u8 = 0x30;

/// One file entry recovered from the headers.
#[derive(Debug)]
struct FileEntry {
    name: String,
    stored: bool,
}

/// Walk RAR4 block headers and classify.
pub fn sniff_rar4(data: &[u8]) -> SniffResult {
    let mut pos = RAR4_MAGIC.len();
    let mut encrypted = false;
    let mut solid = false;
    let mut entries: Vec<FileEntry> = Vec::new();

    while pos + 7 <= data.len() {
        let block_type = data[pos + 2];
        let flags = u16::from_le_bytes([data[pos + 3], data[pos + 4]]);
        let size = u16::from_le_bytes([data[pos + 5], data[pos + 6]]) as usize;
        if size < 7 {
            break;
        }

        let mut data_len = 0usize;

        match block_type {
            // Main archive header: password flag means the block
            // headers themselves are encrypted.
            0x73 => {
                if flags & RAR4_MAIN_FLAG_PASSWORD != 0 {
                    encrypted = true;
                }
            }
            // File header.
            0x74 => {
                if pos + 32 > data.len() {
                    break;
                }
                if flags & RAR4_FLAG_ENCRYPTED != 0 {
                    encrypted = true;
                }
                if flags & RAR4_FLAG_SOLID != 0 {
                    solid = true;
                }

                let pack_size =
                    u32::from_le_bytes([data[pos + 7], data[pos + 8], data[pos + 9], data[pos + 10]])
                        as u64;
                let method = data[pos + 25];
                let name_size =
                    u16::from_le_bytes([data[pos + 26], data[pos + 27]]) as usize;

                let (name_offset, high_pack) = if flags & RAR4_FLAG_LARGE != 0 {
                    if pos + 40 > data.len() {
                        break;
                    }
                    let high = u32::from_le_bytes([
                        data[pos + 32],
                        data[pos + 33],
                        data[pos + 34],
                        data[pos + 35],
                    ]) as u64;
                    (pos + 40, high)
                } else {
                    (pos + 32, 0)
                };

                if name_offset + name_size > data.len() {
                    break;
                }
                let name = String::from_utf8_lossy(&data[name_offset..name_offset + name_size])
                    .to_string();

                entries.push(FileEntry {
                    name,
                    stored: method == METHOD_STORE,
                });

                data_len = (pack_size | (high_pack << 32)) as usize;
            }
            _ => {
                if flags & RAR4_FLAG_LONG_BLOCK != 0 && pos + 11 <= data.len() {
                    data_len = u32::from_le_bytes([
                        data[pos + 7],
                        data[pos + 8],
                        data[pos + 9],
                        data[pos + 10],
                    ]) as usize;
                }
            }
        }

        pos = pos.saturating_add(size).saturating_add(data_len);
    }

    classify_rar(encrypted, solid, &entries, false)
}

/// Walk RAR5 vint-encoded block headers and classify.
pub fn sniff_rar5(data: &[u8]) -> SniffResult {
    match walk_rar5(data) {
        Some((encrypted, solid, entries)) => classify_rar(encrypted, solid, &entries, true),
        None => SniffResult {
            status: ArchiveStatus::Rar5Unsupported,
            entries: Vec::new(),
            nested_names: 0,
            video_names: 0,
            caveats: Vec::new(),
        },
    }
}

fn walk_rar5(data: &[u8]) -> Option<(bool, bool, Vec<FileEntry>)> {
    let mut pos = RAR5_MAGIC.len();
    let mut encrypted = false;
    let mut solid = false;
    let mut entries: Vec<FileEntry> = Vec::new();

    while pos + 4 < data.len() {
        // CRC32 precedes the vint-sized header.
        let mut cursor = Cursor::new(data, pos + 4);
        let header_size = cursor.read_vint()? as usize;
        let header_start = cursor.pos;
        if header_start + header_size > data.len() {
            // Truncated tail is normal for a sampled head; what was
            // walked so far stands.
            break;
        }

        let mut header = Cursor::new(&data[..header_start + header_size], header_start);
        let block_type = header.read_vint()?;
        let block_flags = header.read_vint()?;
        if block_flags & 0x01 != 0 {
            header.read_vint()?; // extra area size
        }
        let data_size = if block_flags & 0x02 != 0 {
            header.read_vint()? as usize
        } else {
            0
        };

        match block_type {
            // Archive encryption header: everything after is opaque.
            4 => {
                encrypted = true;
                break;
            }
            // File header.
            2 => {
                let file_flags = header.read_vint()?;
                header.read_vint()?; // unpacked size
                header.read_vint()?; // attributes
                if file_flags & 0x02 != 0 {
                    header.skip(4)?; // mtime
                }
                if file_flags & 0x04 != 0 {
                    header.skip(4)?; // data CRC
                }
                let compression = header.read_vint()?;
                header.read_vint()?; // host OS
                let name_len = header.read_vint()? as usize;
                let name = header.read_bytes(name_len)?;

                // Compression info: bits 0..5 version, bit 6 solid,
                // bits 7..9 method (0 = store).
                if compression & 0x40 != 0 {
                    solid = true;
                }
                let method = ((compression >> 7) & 0x07) as u8;
                entries.push(FileEntry {
                    name: String::from_utf8_lossy(name).to_string(),
                    stored: method == 0,
                });
            }
            // End of archive.
            5 => break,
            _ => {}
        }

        pos = header_start + header_size + data_size;
    }

    Some((encrypted, solid, entries))
}

fn classify_rar(
    encrypted: bool,
    solid: bool,
    entries: &[FileEntry],
    _rar5: bool,
) -> SniffResult {
    let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    let mut caveats = Vec::new();

    let status = if encrypted {
        ArchiveStatus::RarEncrypted
    } else if solid {
        ArchiveStatus::RarSolid
    } else if entries.iter().any(|e| !e.stored) {
        ArchiveStatus::RarCompressed
    } else if entries
        .iter()
        .any(|e| has_extension(&e.name, VIDEO_EXTENSIONS))
    {
        ArchiveStatus::RarStored
    } else if !entries.is_empty() && entries.iter().all(|e| is_nested_archive_name(&e.name)) {
        ArchiveStatus::RarNestedArchive
    } else {
        // Headers only, nothing conclusive: assume stored but say so.
        caveats.push("rar-header-assumed-stored".to_string());
        ArchiveStatus::RarStored
    };

    SniffResult {
        status,
        entries: names,
        nested_names: 0,
        video_names: 0,
        caveats,
    }
}

/// Whether a member name looks like another archive volume.
pub(crate) fn is_nested_archive_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    if NESTED_ARCHIVE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        return true;
    }
    // Old-style split volumes: .r00, .r01, ...
    if lower.len() >= 4 {
        let tail = &lower[lower.len() - 4..];
        if tail.starts_with(".r") && tail[2..].chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    false
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext))
}

/// Bounds-checked little reader for vint-encoded headers.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Variable-length integer: 7 bits per byte, high bit continues.
    fn read_vint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        if self.pos + n > self.data.len() {
            return None;
        }
        self.pos += n;
        Some(())
    }

    fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }
}
