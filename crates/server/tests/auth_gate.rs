//! The shared-secret gate: no valid token, no service.

mod common;

use axum::http::Method;
use common::*;
use std::sync::atomic::Ordering;

fn settings(endpoint: &str) -> serde_json::Value {
    serde_json::json!({
        "ADDON_SHARED_SECRET": SECRET,
        "NEWZNAB_ENDPOINT_01": endpoint,
        "NEWZNAB_API_KEY_01": "k1",
        "NEWZNAB_NAME_01": "Mock Indexer",
    })
}

#[tokio::test]
async fn health_is_open() {
    let app = make_app(settings("http://127.0.0.1:9"));
    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn metrics_is_open() {
    let app = make_app(settings("http://127.0.0.1:9"));
    let (status, _, body) = request(&app, Method::GET, "/metrics", &[]).await;
    assert_eq!(status, 200);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("streamnab_http_requests_total") || text.is_empty() || text.contains("# "));
}

#[tokio::test]
async fn stream_without_token_is_401_and_never_searches() {
    let (upstream, hits) = mock_newznab(newznab_rss(&[(
        "Movie.2023.1080p",
        "https://x/get/1.nzb",
        1_000_000,
        "Sat, 15 Jun 2024 10:30:00 +0000",
    )]));
    let base = spawn_upstream(upstream).await;
    let app = make_app(settings(&base));

    let (status, _, _) = request(&app, Method::GET, "/stream/movie/tt0111161.json", &[]).await;
    assert_eq!(status, 401);
    assert_eq!(
        hits.load(Ordering::SeqCst),
        0,
        "downstream search must not run for unauthenticated requests"
    );
}

#[tokio::test]
async fn wrong_token_is_401() {
    let app = make_app(settings("http://127.0.0.1:9"));
    let (status, _, _) = request(
        &app,
        Method::GET,
        "/wrong-token/stream/movie/tt0111161.json",
        &[],
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn path_token_is_accepted() {
    let (upstream, _) = mock_newznab(newznab_rss(&[(
        "Movie.2023.1080p",
        "https://x/get/1.nzb",
        1_000_000_000,
        "Sat, 15 Jun 2024 10:30:00 +0000",
    )]));
    let base = spawn_upstream(upstream).await;
    let app = make_app(settings(&base));

    let (status, json) = get_json(
        &app,
        &format!("/{SECRET}/stream/movie/tt0111161.json"),
    )
    .await;
    assert_eq!(status, 200);
    assert!(json["streams"].is_array());
}

#[tokio::test]
async fn bearer_header_is_accepted_on_bare_route() {
    let (upstream, _) = mock_newznab(newznab_rss(&[]));
    let base = spawn_upstream(upstream).await;
    let app = make_app(settings(&base));

    let (status, _, _) = request(
        &app,
        Method::GET,
        "/stream/movie/tt0111161.json",
        &[("Authorization", &format!("Bearer {SECRET}"))],
    )
    .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn manifest_requires_token() {
    let app = make_app(settings("http://127.0.0.1:9"));

    let (status, _, _) = request(&app, Method::GET, "/manifest.json", &[]).await;
    assert_eq!(status, 401);

    let (status, json) = get_json(&app, &format!("/{SECRET}/manifest.json")).await;
    assert_eq!(status, 200);
    assert_eq!(json["resources"][0], "stream");
    assert_eq!(json["types"][0], "movie");
}

#[tokio::test]
async fn config_endpoint_is_sanitized() {
    let app = make_app(settings("http://127.0.0.1:9"));
    let (status, json) = get_json(&app, &format!("/{SECRET}/config")).await;
    assert_eq!(status, 200);
    let text = json.to_string();
    assert!(!text.contains(SECRET), "secrets must be redacted");
    assert_eq!(json["shared_secret_configured"], true);
}
