//! WebDAV directory walking.
//!
//! After a mount completes, the chosen video is found by a
//! breadth-first PROPFIND walk below the job's storage directory,
//! bounded in depth.

use std::collections::VecDeque;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Method};
use tracing::debug;

use crate::config::MountConfig;
use crate::release::normalize_title;
use crate::sniffer::VIDEO_EXTENSIONS;

use super::MountError;

/// BFS depth bound below the walk root.
const MAX_WALK_DEPTH: usize = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry in a WebDAV listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    /// Path relative to the WebDAV root.
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// WebDAV client over the mount service's file tree.
pub struct WebdavClient {
    client: Client,
    config: MountConfig,
}

impl WebdavClient {
    pub fn new(config: MountConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn root(&self) -> &str {
        self.config.webdav_url.trim_end_matches('/')
    }

    /// Absolute URL of a path below the WebDAV root.
    pub fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.root(), path.trim_start_matches('/'))
    }

    /// Credentials for callers that speak to the share directly.
    pub fn auth(&self) -> (&str, &str) {
        (&self.config.webdav_user, &self.config.webdav_pass)
    }

    /// PROPFIND depth 1 on one directory.
    pub async fn list_dir(&self, path: &str) -> Result<Vec<DavEntry>, MountError> {
        let url = self.file_url(path);

        let method = Method::from_bytes(b"PROPFIND").expect("PROPFIND is a valid method");
        let response = self
            .client
            .request(method, &url)
            .basic_auth(&self.config.webdav_user, Some(&self.config.webdav_pass))
            .header("Depth", "1")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MountError::Timeout
                } else {
                    MountError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MountError::Api(format!("PROPFIND HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MountError::Api(e.to_string()))?;

        let mut entries = parse_multistatus(&body)?;
        // The first response element is the directory itself.
        entries.retain(|e| !same_path(&e.path, path));
        Ok(entries)
    }

    /// Breadth-first walk below `root_path`, returning every video
    /// file found within the depth bound.
    pub async fn find_videos(&self, root_path: &str) -> Result<Vec<DavEntry>, MountError> {
        let mut videos = Vec::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((root_path.to_string(), 0));

        while let Some((path, depth)) = queue.pop_front() {
            let entries = self.list_dir(&path).await?;
            for entry in entries {
                if entry.is_dir {
                    if depth + 1 < MAX_WALK_DEPTH {
                        queue.push_back((entry.path.clone(), depth + 1));
                    }
                } else if is_video_name(&entry.name) {
                    videos.push(entry);
                }
            }
        }

        debug!(root = root_path, videos = videos.len(), "WebDAV walk complete");
        Ok(videos)
    }
}

/// Pick the playable video: for series the largest file matching the
/// episode marker, for movies the largest file overall.
pub fn choose_video(videos: &[DavEntry], episode: Option<(u32, u32)>) -> Option<&DavEntry> {
    match episode {
        Some((season, episode)) => {
            let marker = format!("s{season:02}e{episode:02}");
            videos
                .iter()
                .filter(|v| normalize_title(&v.name).split(' ').any(|t| t == marker))
                .max_by_key(|v| v.size)
        }
        None => videos.iter().max_by_key(|v| v.size),
    }
}

pub fn is_video_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn same_path(a: &str, b: &str) -> bool {
    a.trim_matches('/') == b.trim_matches('/')
}

/// Parse a WebDAV multistatus document into entries.
fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>, MountError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut href: Option<String> = None;
    let mut is_dir = false;
    let mut size = 0u64;
    let mut text_target: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()).as_str() {
                "response" => {
                    href = None;
                    is_dir = false;
                    size = 0;
                }
                "href" => text_target = Some("href"),
                "getcontentlength" => text_target = Some("size"),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == "collection" {
                    is_dir = true;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                match text_target {
                    Some("href") => href = Some(text),
                    Some("size") => size = text.parse().unwrap_or(0),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "response" {
                    if let Some(raw_href) = href.take() {
                        let decoded = urlencoding::decode(&raw_href)
                            .map(|s| s.into_owned())
                            .unwrap_or(raw_href);
                        let path = strip_dav_prefix(&decoded);
                        let name = path
                            .trim_end_matches('/')
                            .rsplit('/')
                            .next()
                            .unwrap_or("")
                            .to_string();
                        entries.push(DavEntry {
                            path,
                            name,
                            is_dir,
                            size,
                        });
                    }
                }
                text_target = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MountError::Api(format!("Malformed multistatus: {e}")));
            }
            _ => {}
        }
    }

    Ok(entries)
}

/// Reduce an absolute DAV href to a path below the share root.
fn strip_dav_prefix(href: &str) -> String {
    let path = href
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let path = match path.find('/') {
        Some(idx) if !href.starts_with('/') => &path[idx..],
        _ => href,
    };
    path.trim_start_matches('/')
        .trim_start_matches("dav/")
        .trim_end_matches('/')
        .to_string()
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw).to_lowercase();
    name.rsplit(':').next().unwrap_or(&name).to_string()
}
