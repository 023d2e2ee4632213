//! Ranged playback through the mount proxy.

mod common;

use axum::http::Method;
use common::*;

/// A distinctive 1000-byte file: byte i = i % 251.
fn test_file() -> Vec<u8> {
    (0..1000u32).map(|i| (i % 251) as u8).collect()
}

async fn proxied_app(fail_add: bool) -> axum::Router {
    let mount = spawn_upstream(mock_mount_service(test_file(), fail_add)).await;
    make_app(serde_json::json!({
        "ADDON_SHARED_SECRET": SECRET,
        "NZBDAV_URL": mount,
        "NZBDAV_API_KEY": "mount-key",
        "NZBDAV_WEBDAV_URL": format!("{mount}/dav"),
        "NZBDAV_WEBDAV_USER": "dav",
        "NZBDAV_WEBDAV_PASS": "dav",
    }))
}

fn playback_path() -> String {
    format!(
        "/{SECRET}/nzb/stream?downloadUrl={}&type=movie&id=tt0111161&title=TestJob&size=1000",
        urlencoding::encode("https://indexer.example/getnzb/abc.nzb")
    )
}

#[tokio::test]
async fn range_request_is_forwarded() {
    let app = proxied_app(false).await;

    let (status, headers, body) = request(
        &app,
        Method::GET,
        &playback_path(),
        &[("Range", "bytes=100-199")],
    )
    .await;

    assert_eq!(status, 206);
    assert_eq!(
        headers.get("content-range").unwrap().to_str().unwrap(),
        "bytes 100-199/1000"
    );
    assert_eq!(body.len(), 100);
    assert_eq!(body[0], (100 % 251) as u8);
    assert_eq!(headers.get("accept-ranges").unwrap(), "bytes");
}

#[tokio::test]
async fn first_byte_range() {
    let app = proxied_app(false).await;

    let (status, headers, body) = request(
        &app,
        Method::GET,
        &playback_path(),
        &[("Range", "bytes=0-0")],
    )
    .await;

    assert_eq!(status, 206);
    assert_eq!(
        headers.get("content-range").unwrap().to_str().unwrap(),
        "bytes 0-0/1000"
    );
    assert_eq!(body.len(), 1);
}

#[tokio::test]
async fn out_of_bounds_range_is_416() {
    let app = proxied_app(false).await;

    let (status, headers, _) = request(
        &app,
        Method::GET,
        &playback_path(),
        &[("Range", "bytes=1000-")],
    )
    .await;

    assert_eq!(status, 416);
    assert_eq!(
        headers.get("content-range").unwrap().to_str().unwrap(),
        "bytes */1000"
    );
}

#[tokio::test]
async fn full_body_without_range() {
    let app = proxied_app(false).await;

    let (status, headers, body) = request(&app, Method::GET, &playback_path(), &[]).await;

    assert_eq!(status, 200);
    assert_eq!(body, test_file());
    // The mock serves octet-stream; the proxy infers from the filename.
    assert_eq!(
        headers.get("content-type").unwrap().to_str().unwrap(),
        "video/x-matroska"
    );
    let disposition = headers.get("content-disposition").unwrap().to_str().unwrap();
    assert!(disposition.starts_with("inline; filename=\""));
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn head_request_returns_headers_only() {
    let app = proxied_app(false).await;

    let (status, _headers, body) = request(&app, Method::HEAD, &playback_path(), &[]).await;

    assert_eq!(status, 200);
    assert!(body.is_empty(), "HEAD must not carry a body");
}

#[tokio::test]
async fn other_methods_are_405() {
    let app = proxied_app(false).await;

    let (status, _, _) = request(&app, Method::POST, &playback_path(), &[]).await;
    assert_eq!(status, 405);

    let (status, _, _) = request(&app, Method::DELETE, &playback_path(), &[]).await;
    assert_eq!(status, 405);
}

#[tokio::test]
async fn mount_failure_serves_fallback_video() {
    let app = proxied_app(true).await;

    let (status, headers, body) = request(&app, Method::GET, &playback_path(), &[]).await;

    assert_eq!(status, 200, "fallback is a playable response, not an error page");
    assert_eq!(
        headers.get("content-type").unwrap().to_str().unwrap(),
        "video/mp4"
    );
    let failure = headers.get("x-nzbdav-failure").unwrap().to_str().unwrap();
    assert!(failure.contains("mount rejected the NZB"), "{failure}");
    assert_eq!(&body[4..8], b"ftyp");
}

#[tokio::test]
async fn fallback_head_honored() {
    let app = proxied_app(true).await;

    let (status, headers, body) = request(&app, Method::HEAD, &playback_path(), &[]).await;
    assert_eq!(status, 200);
    assert!(headers.contains_key("x-nzbdav-failure"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn playback_requires_token() {
    let app = proxied_app(false).await;
    let path = playback_path().replace(&format!("/{SECRET}/"), "/");
    let (status, _, _) = request(&app, Method::GET, &path, &[]).await;
    assert_eq!(status, 401);
}
