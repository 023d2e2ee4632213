//! The playback proxy.
//!
//! Resolves (or creates) a mount for the chosen NZB through the
//! single-flight mount cache, then forwards ranged GET/HEAD requests to
//! the mount service's WebDAV endpoint, rewriting headers on the way
//! back. Catastrophic failures stream a fallback video instead of an
//! error page so players always have something to show.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use streamnab_core::cache::MountKey;
use streamnab_core::mount::{MountError, MountHandle, NzbSource};
use streamnab_core::StreamRequest;

use crate::state::AppState;

/// Hop-by-hop headers never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Playback query parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackQuery {
    #[serde(default)]
    pub download_url: String,
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub history_nzo_id: Option<String>,
    #[serde(default)]
    pub history_job_name: Option<String>,
    #[serde(default)]
    pub history_category: Option<String>,
    #[serde(default)]
    pub easynews_payload: Option<String>,
}

/// `GET|HEAD /nzb/stream`
pub async fn playback_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<PlaybackQuery>,
) -> Response {
    let is_head = method == Method::HEAD;

    let handle = match resolve_mount(&state, &query).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(title = %query.title, error = %e, "Mount failed, serving fallback video");
            return fallback_response(&e, is_head);
        }
    };

    // Range sanity against the chosen file before touching upstream.
    // The declared size from the stream list is the fallback when the
    // WebDAV listing did not carry one.
    let total = if handle.file_size > 0 {
        handle.file_size
    } else {
        query.size.unwrap_or(0)
    };
    if let Some(range_header) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        if let Some((start, _)) = parse_range(range_header) {
            if total > 0 && start >= total {
                return range_not_satisfiable(total);
            }
        }
    }

    match forward(&state, &query, &handle, &method, &headers).await {
        Ok(response) => response,
        Err(e) => {
            warn!(title = %query.title, error = %e, "Upstream stream failed");
            fallback_response(&e, is_head)
        }
    }
}

/// Resolve the mount handle through the single-flight cache.
async fn resolve_mount(
    state: &Arc<AppState>,
    query: &PlaybackQuery,
) -> Result<MountHandle, MountError> {
    let Some(mount) = state.mount().cloned() else {
        return Err(MountError::Api("mount service is not configured".to_string()));
    };

    let category = if query.content_type == "series" {
        state.config().mount.category_series.clone()
    } else {
        state.config().mount.category_movies.clone()
    };

    let episode = StreamRequest::parse(&query.content_type, &query.id)
        .and_then(|r| r.episode_pair());

    let cache_key = MountKey {
        download_url: if !query.download_url.is_empty() {
            query.download_url.clone()
        } else {
            format!(
                "easynews:{}",
                query.easynews_payload.as_deref().unwrap_or_default()
            )
        },
        category: category.clone(),
        episode: episode.map(|(s, e)| format!("s{s:02}e{e:02}")),
    };

    // Prefer the job already completed in history, then the verified
    // NZB bytes, then the Easynews builder, then plain addurl.
    let history = query
        .history_nzo_id
        .clone()
        .zip(query.history_job_name.clone());
    let history_category = query
        .history_category
        .clone()
        .unwrap_or_else(|| category.clone());
    let cached_nzb = state.nzb_cache().get(&cache_key.download_url);
    let easynews = state.easynews().cloned();
    let easynews_payload = query.easynews_payload.clone();
    let download_url = query.download_url.clone();
    let title = query.title.clone();

    state
        .mount_cache()
        .get_or_build(&cache_key, move || {
            async move {
                if let Some((nzo_id, job_name)) = history {
                    debug!(job = %job_name, "Resolving completed mount from history");
                    return mount
                        .resolve_existing(&nzo_id, &job_name, &history_category, episode)
                        .await;
                }

                let source = if let Some(cached) = cached_nzb {
                    NzbSource::File {
                        filename: cached.filename,
                        body: cached.body,
                    }
                } else if let Some(payload) = easynews_payload.filter(|p| !p.is_empty()) {
                    let client = easynews.ok_or_else(|| {
                        MountError::Api("Easynews is not enabled".to_string())
                    })?;
                    let body = client
                        .fetch_nzb(&payload)
                        .await
                        .map_err(|e| MountError::Api(e.to_string()))?;
                    NzbSource::File {
                        filename: format!("{}.nzb", sanitize_filename(&title)),
                        body,
                    }
                } else if !download_url.is_empty() {
                    NzbSource::Url(download_url)
                } else {
                    return Err(MountError::Api("no NZB source in request".to_string()));
                };

                mount.mount(source, &category, episode).await
            }
            .boxed()
        })
        .await
}

/// Forward the ranged request upstream and rewrite the response.
async fn forward(
    state: &Arc<AppState>,
    query: &PlaybackQuery,
    handle: &MountHandle,
    method: &Method,
    headers: &HeaderMap,
) -> Result<Response, MountError> {
    let mount = state
        .mount()
        .ok_or_else(|| MountError::Api("mount service is not configured".to_string()))?;

    let upstream_url = mount.file_url(handle);
    let (user, pass) = mount.webdav_auth();

    let client = reqwest::Client::new();
    let mut request = client
        .request(
            reqwest::Method::from_bytes(method.as_str().as_bytes())
                .unwrap_or(reqwest::Method::GET),
            &upstream_url,
        )
        .basic_auth(user, Some(pass));

    if let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        request = request.header(reqwest::header::RANGE, range);
    }

    let upstream = request
        .send()
        .await
        .map_err(|e| MountError::Api(e.to_string()))?;

    let status = upstream.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(MountError::Api(format!("upstream HTTP {status}")));
    }

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK));

    for (name, value) in upstream.headers() {
        let lower = name.as_str().to_lowercase();
        if HOP_BY_HOP.contains(&lower.as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let upstream_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    if upstream_type == "application/octet-stream" {
        builder = builder.header(header::CONTENT_TYPE, content_type_for(&handle.filename));
    }

    builder = builder
        .header(header::ACCEPT_RANGES, "bytes")
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", sanitize_filename(&handle.filename)),
        )
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, "*");

    debug!(
        title = %query.title,
        status = status.as_u16(),
        path = %handle.mount_path,
        "Proxying stream"
    );

    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        // A client hanging up mid-stream surfaces as a closed body
        // sink; the stream just stops, nothing to propagate.
        Body::from_stream(upstream.bytes_stream())
    };

    builder
        .body(body)
        .map_err(|e| MountError::Api(e.to_string()))
}

/// `Range: bytes=a-b` with an open or closed end.
fn parse_range(raw: &str) -> Option<(u64, Option<u64>)> {
    let spec = raw.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = end.trim();
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };
    Some((start, end))
}

fn range_not_satisfiable(total: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE, format!("bytes */{total}"))],
    )
        .into_response()
}

/// The fallback MP4 for a failure, with the cause in the
/// `X-NZBDav-Failure` header. HEAD gets the headers only.
fn fallback_response(error: &MountError, is_head: bool) -> Response {
    let asset: &[u8] = match error {
        MountError::NoPlayableVideo(_) => &NO_VIDEO_FOUND_MP4,
        _ => &NZB_FAILURE_MP4,
    };

    let failure = error
        .to_string()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, asset.len())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
    builder = builder.header("X-NZBDav-Failure", failure);

    let body = if is_head {
        Body::empty()
    } else {
        Body::from(asset.to_vec())
    };

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Content types for the playable extensions.
fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    let ext = lower.rsplit('.').next().unwrap_or("");
    match ext {
        "mkv" => "video/x-matroska",
        "mp4" | "m4v" => "video/mp4",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        "mpg" | "mpeg" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// Keep the filename ASCII and quote-safe for Content-Disposition.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim().to_string();
    if trimmed.is_empty() {
        "stream".to_string()
    } else {
        trimmed
    }
}

/// A minimal MP4 container: ftyp plus a free box carrying the label.
fn minimal_mp4(label: &str) -> Vec<u8> {
    let mut out = Vec::new();

    let ftyp_payload = b"isomisomiso2mp41";
    out.extend_from_slice(&((8 + ftyp_payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(b"ftyp");
    out.extend_from_slice(ftyp_payload);

    let label_bytes = label.as_bytes();
    out.extend_from_slice(&((8 + label_bytes.len()) as u32).to_be_bytes());
    out.extend_from_slice(b"free");
    out.extend_from_slice(label_bytes);

    out.extend_from_slice(&8u32.to_be_bytes());
    out.extend_from_slice(b"mdat");

    out
}

static NZB_FAILURE_MP4: Lazy<Vec<u8>> = Lazy::new(|| minimal_mp4("NZB failure"));
static NO_VIDEO_FOUND_MP4: Lazy<Vec<u8>> = Lazy::new(|| minimal_mp4("no video found"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("bytes=0-0"), Some((0, Some(0))));
        assert_eq!(parse_range("bytes=100-199"), Some((100, Some(199))));
        assert_eq!(parse_range("bytes=500-"), Some((500, None)));
        assert_eq!(parse_range("bytes = 1-2"), None);
        assert_eq!(parse_range("items=0-1"), None);
        assert_eq!(parse_range("bytes=a-b"), None);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("movie.mkv"), "video/x-matroska");
        assert_eq!(content_type_for("Movie.MP4"), "video/mp4");
        assert_eq!(content_type_for("clip.webm"), "video/webm");
        assert_eq!(content_type_for("unknown.bin"), "application/octet-stream");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("movie.mkv"), "movie.mkv");
        assert_eq!(sanitize_filename("we\"ird/na:me.mkv"), "we_ird_na_me.mkv");
        assert_eq!(sanitize_filename(""), "stream");
    }

    #[test]
    fn test_minimal_mp4_shape() {
        let mp4 = minimal_mp4("NZB failure");
        assert_eq!(&mp4[4..8], b"ftyp");
        assert!(mp4.windows(4).any(|w| w == b"free"));
        assert!(mp4.windows(4).any(|w| w == b"mdat"));
        // The two assets differ.
        assert_ne!(*NZB_FAILURE_MP4, *NO_VIDEO_FOUND_MP4);
    }

    #[test]
    fn test_fallback_response_carries_failure_header() {
        let response = fallback_response(&MountError::JobFailed("articles missing".into()), false);
        assert_eq!(response.status(), StatusCode::OK);
        let failure = response.headers().get("X-NZBDav-Failure").unwrap();
        assert!(failure.to_str().unwrap().contains("articles missing"));
    }

    #[test]
    fn test_fallback_no_video_uses_other_asset() {
        let a = fallback_response(&MountError::NoPlayableVideo("dir".into()), false);
        let b = fallback_response(&MountError::Timeout, false);
        let len_a = a.headers().get(header::CONTENT_LENGTH).unwrap();
        let len_b = b.headers().get(header::CONTENT_LENGTH).unwrap();
        assert_ne!(len_a, len_b);
    }

    #[test]
    fn test_range_not_satisfiable_shape() {
        let response = range_not_satisfiable(1000);
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            &HeaderValue::from_static("bytes */1000")
        );
    }
}
