//! NZB XML parsing.

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex_lite::Regex;

use super::NzbError;

/// A parsed NZB: meta title plus the ordered file list.
#[derive(Debug, Clone)]
pub struct NzbDocument {
    /// `nzb/head/meta[@type=title]` when present.
    pub title: Option<String>,
    pub files: Vec<NzbFile>,
}

impl NzbDocument {
    /// Total declared payload size across all segments.
    pub fn total_bytes(&self) -> u64 {
        self.files
            .iter()
            .flat_map(|f| f.segments.iter())
            .map(|s| s.bytes)
            .sum()
    }
}

/// One file entry with its ordered segment list.
#[derive(Debug, Clone)]
pub struct NzbFile {
    pub subject: String,
    /// Best-effort filename extracted from the subject.
    pub filename: String,
    /// Lowercased extension of the inferred filename, with leading dot.
    pub extension: String,
    pub segments: Vec<NzbSegment>,
}

/// One article holding a fragment of a file.
#[derive(Debug, Clone)]
pub struct NzbSegment {
    /// 1-based segment number.
    pub number: u32,
    /// Declared encoded size.
    pub bytes: u64,
    /// Message-id without angle brackets.
    pub message_id: String,
}

/// Filenames embedded in subjects without quotes still end in a known
/// archive or video extension.
static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)([A-Za-z0-9_+\-.()\[\] ]+\.(?:mkv|mp4|mov|avi|ts|m4v|mpg|mpeg|wmv|flv|webm|rar|r\d{2}|7z|zip|par2|nfo|nzb|sfv))"#,
    )
    .expect("filename regex is valid")
});

/// Parse NZB XML into a document tree. Segments are sorted by number.
pub fn parse_nzb(xml: &str) -> Result<NzbDocument, NzbError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut title: Option<String> = None;
    let mut files: Vec<NzbFile> = Vec::new();

    let mut current_file: Option<NzbFile> = None;
    let mut current_segment: Option<NzbSegment> = None;
    let mut in_title_meta = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "meta" => {
                        in_title_meta = e.attributes().flatten().any(|a| {
                            local_name(a.key.as_ref()) == "type"
                                && a.unescape_value()
                                    .map(|v| v.eq_ignore_ascii_case("title"))
                                    .unwrap_or(false)
                        });
                    }
                    "file" => {
                        let subject = e
                            .attributes()
                            .flatten()
                            .find(|a| local_name(a.key.as_ref()) == "subject")
                            .and_then(|a| a.unescape_value().ok())
                            .map(|v| v.to_string())
                            .unwrap_or_default();

                        let filename = filename_from_subject(&subject);
                        let extension = extension_of(&filename);

                        current_file = Some(NzbFile {
                            subject,
                            filename,
                            extension,
                            segments: Vec::new(),
                        });
                    }
                    "segment" => {
                        let mut number = 0u32;
                        let mut bytes = 0u64;
                        for attr in e.attributes().flatten() {
                            let key = local_name(attr.key.as_ref());
                            let value = attr.unescape_value().unwrap_or_default();
                            match key.as_str() {
                                "number" => number = value.parse().unwrap_or(0),
                                "bytes" => bytes = value.parse().unwrap_or(0),
                                _ => {}
                            }
                        }
                        current_segment = Some(NzbSegment {
                            number,
                            bytes,
                            message_id: String::new(),
                        });
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if in_title_meta {
                    title = Some(text);
                } else if let Some(segment) = current_segment.as_mut() {
                    segment.message_id = text;
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "meta" => in_title_meta = false,
                    "segment" => {
                        if let (Some(file), Some(segment)) =
                            (current_file.as_mut(), current_segment.take())
                        {
                            if !segment.message_id.is_empty() {
                                file.segments.push(segment);
                            }
                        }
                    }
                    "file" => {
                        if let Some(mut file) = current_file.take() {
                            file.segments.sort_by_key(|s| s.number);
                            files.push(file);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(NzbError::InvalidXml(e.to_string())),
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(NzbError::Empty);
    }

    Ok(NzbDocument { title, files })
}

/// Extract a filename from a subject line: a quoted substring wins,
/// otherwise the first extension-bearing token, otherwise the subject
/// itself.
pub fn filename_from_subject(subject: &str) -> String {
    if let Some(start) = subject.find('"') {
        if let Some(end) = subject[start + 1..].find('"') {
            let quoted = &subject[start + 1..start + 1 + end];
            if !quoted.is_empty() {
                return quoted.to_string();
            }
        }
    }

    if let Some(m) = FILENAME_RE.find(subject) {
        return m.as_str().trim().to_string();
    }

    subject.to_string()
}

/// Lowercased extension with leading dot, empty when there is none.
pub fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx + 1 < filename.len() => filename[idx..].to_lowercase(),
        _ => String::new(),
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw).to_lowercase();
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NZB: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.nzb.org/DTD/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head>
    <meta type="title">Some.Movie.2023.1080p</meta>
    <meta type="password"></meta>
  </head>
  <file poster="poster@example.com" date="1718445000" subject="Some.Movie.2023 [01/20] - &quot;some.movie.2023.part01.rar&quot; yEnc (1/3)">
    <groups><group>alt.binaries.movies</group></groups>
    <segments>
      <segment bytes="700000" number="2">part1-seg2@example.com</segment>
      <segment bytes="700000" number="1">part1-seg1@example.com</segment>
      <segment bytes="350000" number="3">part1-seg3@example.com</segment>
    </segments>
  </file>
  <file subject="Some.Movie.2023 [02/20] - &quot;some.movie.2023.part02.rar&quot; yEnc (1/2)">
    <segments>
      <segment bytes="700000" number="1">part2-seg1@example.com</segment>
      <segment bytes="700000" number="2">part2-seg2@example.com</segment>
    </segments>
  </file>
</nzb>"#;

    #[test]
    fn test_parse_counts_match_xml() {
        let doc = parse_nzb(SAMPLE_NZB).unwrap();
        assert_eq!(doc.files.len(), 2);
        assert_eq!(doc.files[0].segments.len(), 3);
        assert_eq!(doc.files[1].segments.len(), 2);
        assert_eq!(doc.title.as_deref(), Some("Some.Movie.2023.1080p"));
    }

    #[test]
    fn test_segments_sorted_by_number() {
        let doc = parse_nzb(SAMPLE_NZB).unwrap();
        let numbers: Vec<u32> = doc.files[0].segments.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(doc.files[0].segments[0].message_id, "part1-seg1@example.com");
    }

    #[test]
    fn test_filename_and_extension_inference() {
        let doc = parse_nzb(SAMPLE_NZB).unwrap();
        assert_eq!(doc.files[0].filename, "some.movie.2023.part01.rar");
        assert_eq!(doc.files[0].extension, ".rar");
    }

    #[test]
    fn test_total_bytes() {
        let doc = parse_nzb(SAMPLE_NZB).unwrap();
        assert_eq!(doc.total_bytes(), 700000 * 4 + 350000);
    }

    #[test]
    fn test_unquoted_filename_falls_back_to_regex() {
        assert_eq!(
            filename_from_subject("Re: posting movie.final.mkv now (1/5)"),
            "movie.final.mkv"
        );
        assert_eq!(
            filename_from_subject("archive volume abc.r01 posted"),
            "abc.r01"
        );
    }

    #[test]
    fn test_no_filename_keeps_subject() {
        assert_eq!(
            filename_from_subject("just words no file here"),
            "just words no file here"
        );
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("movie.MKV"), ".mkv");
        assert_eq!(extension_of("archive.part01.RAR"), ".rar");
        assert_eq!(extension_of("abc.r00"), ".r00");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_invalid_xml() {
        assert!(matches!(
            parse_nzb("<nzb><file></nzb>"),
            Err(NzbError::InvalidXml(_))
        ));
    }

    #[test]
    fn test_empty_nzb() {
        assert!(matches!(
            parse_nzb(r#"<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb"></nzb>"#),
            Err(NzbError::Empty)
        ));
    }
}
