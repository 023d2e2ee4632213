use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{easynews, handlers, middleware, proxy, streams};
use crate::state::AppState;

/// The full route tree.
///
/// Gated routes are reachable bare (credentials via header or query)
/// and under the `/{token}` prefix media clients use; `/health` and
/// `/metrics` are open.
pub fn create_router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .route("/manifest.json", get(handlers::manifest))
        .route("/config", get(handlers::get_config))
        .route("/stream/{type}/{id}", get(streams::stream_handler))
        // `get` also matches HEAD; the handler strips the body itself.
        .route("/nzb/stream", get(proxy::playback_handler))
        .route("/easynews/nzb", get(easynews::easynews_nzb_handler))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .nest("/{token}", gated.clone())
        .merge(gated)
        .layer(from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
