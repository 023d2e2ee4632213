//! Authentication and metrics middleware.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use streamnab_core::AuthRequest;

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware: request duration, counts, in-flight gauge.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let response = next.run(request).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware for the token-gated routes.
///
/// The shared secret may arrive as the leading path segment, as a
/// bearer / api-key header, or as a `token` query parameter. Every
/// candidate found is tried; any match admits the request.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authenticator = state.authenticator();

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let mut candidates: Vec<Option<String>> = Vec::new();
    // Leading path segment (the `/{token}/...` form).
    candidates.push(
        request
            .uri()
            .path()
            .split('/')
            .find(|s| !s.is_empty())
            .map(|s| s.to_string()),
    );
    // `?token=` query parameter.
    candidates.push(request.uri().query().and_then(|q| {
        q.split('&')
            .find_map(|pair| pair.strip_prefix("token=").map(|v| v.to_string()))
    }));
    // Header-borne credentials, tried last with no path token set.
    candidates.push(None);

    for token in candidates {
        let auth_request = AuthRequest::new(token, headers.clone());
        if auth_request.credential().is_none() {
            continue;
        }
        if authenticator.authenticate(&auth_request).await.is_ok() {
            return Ok(next.run(request).await);
        }
    }

    AUTH_FAILURES_TOTAL
        .with_label_values(&["invalid_or_missing"])
        .inc();
    Err(StatusCode::UNAUTHORIZED)
}
