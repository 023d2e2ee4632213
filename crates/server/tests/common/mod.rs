//! Shared helpers for server integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use streamnab_core::load_config_from_str;
use streamnab_server::{create_router, AppState};

pub const SECRET: &str = "test-secret";

/// Build the app router from a flat settings object.
pub fn make_app(settings: serde_json::Value) -> Router {
    let config = load_config_from_str(&settings.to_string()).expect("valid test settings");
    create_router(Arc::new(AppState::new(config)))
}

/// One in-process request, returning status, headers and body bytes.
pub async fn request(
    app: &Router,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).expect("valid request");

    let response = app.clone().oneshot(request).await.expect("app response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes()
        .to_vec();
    (status, headers, body)
}

pub async fn get_json(
    app: &Router,
    path: &str,
) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = request(app, Method::GET, path, &[]).await;
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Serve a router on an ephemeral port, returning its base URL.
pub async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// A mock Newznab endpoint serving fixed RSS for every search, with a
/// hit counter for auth-gate assertions.
pub fn mock_newznab(rss: String) -> (Router, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let hits_clone = hits.clone();

    let app = Router::new().route(
        "/api",
        get(move || {
            let rss = rss.clone();
            let hits = hits_clone.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                ([(header::CONTENT_TYPE, "application/rss+xml")], rss)
            }
        }),
    );

    (app, hits)
}

/// Render a Newznab RSS payload from (title, url, size, pubdate) rows.
pub fn newznab_rss(items: &[(&str, &str, u64, &str)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
<channel><title>mock</title>"#,
    );
    for (title, url, size, pubdate) in items {
        body.push_str(&format!(
            r#"<item>
<title>{title}</title>
<link>{url}</link>
<pubDate>{pubdate}</pubDate>
<enclosure url="{url}" length="{size}" type="application/x-nzb"/>
<newznab:attr name="size" value="{size}"/>
</item>"#
        ));
    }
    body.push_str("</channel></rss>");
    body
}

/// A mock mount service: SABnzbd-style API plus a ranged WebDAV file.
///
/// Serves one completed job ("TestJob") whose directory holds
/// `movie.mkv` with the given bytes.
pub fn mock_mount_service(file: Vec<u8>, fail_add: bool) -> Router {
    let file = Arc::new(file);

    let api_file = file.clone();
    let api = move |request: Request| {
        let file = api_file.clone();
        async move {
            let query = request.uri().query().unwrap_or("");
            if query.contains("mode=addurl") || query.contains("mode=addfile") {
                if fail_add {
                    return axum::Json(serde_json::json!({
                        "status": false,
                        "error": "mount rejected the NZB",
                    }))
                    .into_response();
                }
                return axum::Json(serde_json::json!({
                    "status": true,
                    "nzo_ids": ["nzo-test-1"],
                }))
                .into_response();
            }
            if query.contains("mode=history") {
                return axum::Json(serde_json::json!({
                    "history": { "slots": [{
                        "nzo_id": "nzo-test-1",
                        "name": "TestJob",
                        "status": "Completed",
                        "category": "movies",
                        "storage": "movies/TestJob",
                        "fail_message": "",
                    }]}
                }))
                .into_response();
            }
            let _ = file;
            StatusCode::BAD_REQUEST.into_response()
        }
    };

    let dav_file = file.clone();
    let dav = move |request: Request| {
        let file = dav_file.clone();
        async move { dav_handler(request, &file).await }
    };

    Router::new()
        .route("/api", any(api))
        .route("/dav/{*path}", any(dav))
}

async fn dav_handler(request: Request, file: &[u8]) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if method.as_str() == "PROPFIND" {
        let multistatus = format!(
            r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/movies/TestJob/</D:href>
    <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/dav/movies/TestJob/movie.mkv</D:href>
    <D:propstat><D:prop>
      <D:resourcetype/>
      <D:getcontentlength>{}</D:getcontentlength>
    </D:prop></D:propstat>
  </D:response>
</D:multistatus>"#,
            file.len()
        );
        return (
            StatusCode::MULTI_STATUS,
            [(header::CONTENT_TYPE, "application/xml")],
            multistatus,
        )
            .into_response();
    }

    if !path.ends_with("movie.mkv") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let total = file.len() as u64;
    let range = request
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_header);

    let (status, start, end) = match range {
        Some((start, end)) => {
            if start >= total {
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, format!("bytes */{total}"))],
                )
                    .into_response();
            }
            let end = end.unwrap_or(total - 1).min(total - 1);
            (StatusCode::PARTIAL_CONTENT, start, end)
        }
        None => (StatusCode::OK, 0, total - 1),
    };

    let slice = file[start as usize..=end as usize].to_vec();
    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, slice.len());
    if status == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{total}"),
        );
    }

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(slice)
    };
    response.body(body).expect("valid dav response")
}

fn parse_range_header(raw: &str) -> Option<(u64, Option<u64>)> {
    let spec = raw.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}
